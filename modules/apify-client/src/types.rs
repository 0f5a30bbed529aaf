use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input for the apify/instagram-post-scraper actor.
#[derive(Debug, Clone, Serialize)]
pub struct InstagramProfileInput {
    pub username: Vec<String>,
    #[serde(rename = "resultsLimit")]
    pub results_limit: u32,
}

/// Input for the apify/instagram-hashtag-scraper actor.
#[derive(Debug, Clone, Serialize)]
pub struct InstagramHashtagInput {
    pub hashtags: Vec<String>,
    #[serde(rename = "resultsLimit")]
    pub results_limit: u32,
}

/// A single Instagram post from an Apify dataset.
/// Both the profile and the hashtag scraper emit this schema.
#[derive(Debug, Clone, Deserialize)]
pub struct InstagramPost {
    pub id: Option<String>,
    #[serde(rename = "shortCode")]
    pub short_code: Option<String>,
    pub url: Option<String>,
    pub caption: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(rename = "ownerUsername")]
    pub owner_username: Option<String>,
    #[serde(rename = "displayUrl")]
    pub display_url: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(rename = "videoUrl")]
    pub video_url: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl InstagramPost {
    /// Stable key for the post: short code, else the numeric id, else the URL.
    /// Blank fields are skipped.
    pub fn key(&self) -> Option<&str> {
        [&self.short_code, &self.id, &self.url]
            .into_iter()
            .filter_map(|k| k.as_deref())
            .find(|k| !k.trim().is_empty())
    }

    /// Every media URL on the post, display image first, without repeats.
    pub fn media_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        let candidates = self
            .display_url
            .iter()
            .chain(self.images.iter())
            .chain(self.video_url.iter());
        for url in candidates {
            if !url.is_empty() && !urls.contains(url) {
                urls.push(url.clone());
            }
        }
        urls
    }
}

/// Wrapper for Apify API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Metadata for an actor run.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Succeeded,
    Failed,
}

impl RunData {
    pub fn state(&self) -> RunState {
        match self.status.as_str() {
            "SUCCEEDED" => RunState::Succeeded,
            "FAILED" | "ABORTED" | "TIMED-OUT" => RunState::Failed,
            _ => RunState::Running,
        }
    }
}
