pub mod error;
pub mod types;

pub use error::{ApifyError, Result};
pub use types::{InstagramHashtagInput, InstagramPost, InstagramProfileInput, RunData, RunState};

use serde::de::DeserializeOwned;
use serde::Serialize;
use types::ApiResponse;

const BASE_URL: &str = "https://api.apify.com/v2";

/// Actor ID for apify/instagram-post-scraper.
const INSTAGRAM_POST_SCRAPER: &str = "nH2AHrwxeTRJoN5hX";

/// Actor ID for apify/instagram-hashtag-scraper.
const INSTAGRAM_HASHTAG_SCRAPER: &str = "reGe1ST3OBgYZSsZJ";

pub struct ApifyClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl ApifyClient {
    pub fn new(token: String) -> Self {
        Self::with_base_url(token, BASE_URL.to_string())
    }

    pub fn with_base_url(token: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Posts from one Instagram profile.
    pub async fn scrape_instagram_profile(
        &self,
        username: &str,
        limit: u32,
    ) -> Result<Vec<InstagramPost>> {
        tracing::info!(username, limit, "Starting Instagram profile scrape");
        let input = InstagramProfileInput {
            username: vec![username.to_string()],
            results_limit: limit,
        };
        let posts: Vec<InstagramPost> = self.run_actor(INSTAGRAM_POST_SCRAPER, &input).await?;
        tracing::info!(username, count = posts.len(), "Fetched Instagram profile posts");
        Ok(posts)
    }

    /// Recent posts for a set of hashtags.
    pub async fn scrape_instagram_hashtags(
        &self,
        hashtags: &[String],
        limit: u32,
    ) -> Result<Vec<InstagramPost>> {
        tracing::info!(?hashtags, limit, "Starting Instagram hashtag scrape");
        let input = InstagramHashtagInput {
            hashtags: hashtags.to_vec(),
            results_limit: limit,
        };
        let posts: Vec<InstagramPost> = self.run_actor(INSTAGRAM_HASHTAG_SCRAPER, &input).await?;
        tracing::info!(count = posts.len(), "Fetched Instagram hashtag posts");
        Ok(posts)
    }

    /// Start an actor run, wait for it, and return its dataset items.
    async fn run_actor<I, T>(&self, actor_id: &str, input: &I) -> Result<Vec<T>>
    where
        I: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let run = self.start_run(actor_id, input).await?;
        tracing::info!(run_id = %run.id, "Apify run started, polling for completion");

        let completed = self.wait_for_run(&run.id).await?;
        tracing::info!(
            run_id = %completed.id,
            dataset_id = %completed.default_dataset_id,
            "Run completed, fetching results"
        );

        self.get_dataset_items(&completed.default_dataset_id).await
    }

    async fn start_run<I: Serialize + ?Sized>(&self, actor_id: &str, input: &I) -> Result<RunData> {
        let url = format!("{}/acts/{}/runs", self.base_url, actor_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;

        let api_resp: ApiResponse<RunData> = Self::parse(resp).await?;
        Ok(api_resp.data)
    }

    /// Poll until a run completes. Uses `waitForFinish=60` for long-polling.
    pub async fn wait_for_run(&self, run_id: &str) -> Result<RunData> {
        loop {
            let url = format!("{}/actor-runs/{}?waitForFinish=60", self.base_url, run_id);
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await?;

            let api_resp: ApiResponse<RunData> = Self::parse(resp).await?;
            let run = api_resp.data;
            match run.state() {
                RunState::Succeeded => return Ok(run),
                RunState::Failed => {
                    return Err(ApifyError::RunFailed {
                        run_id: run.id,
                        status: run.status,
                    })
                }
                RunState::Running => {
                    tracing::debug!(run_id, status = %run.status, "Run still in progress");
                }
            }
        }
    }

    /// Fetch dataset items from a completed run.
    pub async fn get_dataset_items<T: DeserializeOwned>(&self, dataset_id: &str) -> Result<Vec<T>> {
        let url = format!("{}/datasets/{}/items?format=json", self.base_url, dataset_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        Self::parse(resp).await
    }

    async fn parse<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
