pub mod cleaner;
pub mod filter;
pub mod locks;
pub mod orchestrator;
pub mod ruleset;
pub mod sources;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod uploader;

pub use filter::FilterEngine;
pub use orchestrator::{Orchestrator, PassError};
pub use ruleset::{KeywordRule, KeywordRuleset, RulesetError};
pub use uploader::{RetryPolicy, UploadBackend, UploadOutcome, Uploader};
