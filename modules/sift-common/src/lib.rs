pub mod config;
pub mod error;
pub mod file_config;
pub mod stats;
pub mod types;

pub use config::AppConfig;
pub use error::{Result, SiftError};
pub use file_config::FileConfig;
pub use stats::PassStats;
pub use types::*;
