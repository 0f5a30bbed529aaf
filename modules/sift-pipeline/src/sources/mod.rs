pub mod apify;
pub mod csv_export;

use anyhow::Result;
use async_trait::async_trait;
use sift_common::RawCandidate;

pub use apify::ApifySource;
pub use csv_export::CsvExportSource;

/// Hands the pipeline one batch of raw candidates per pass.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<RawCandidate>>;
}
