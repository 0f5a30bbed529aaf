pub mod error;

pub use error::{Result, SupabaseError};

use std::time::Duration;

use serde::Serialize;

/// Pure PostgREST client for writing rows into one Supabase project.
pub struct SupabaseClient {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(base_url: &str, service_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
        })
    }

    /// Insert rows into `table`. With a non-empty `on_conflict` column the
    /// insert becomes an upsert that merges on that column.
    pub async fn insert<T: Serialize + ?Sized>(
        &self,
        table: &str,
        rows: &T,
        on_conflict: Option<&str>,
    ) -> Result<()> {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        let body = serde_json::to_vec(rows)?;

        let mut request = self
            .client
            .post(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        request = match on_conflict.filter(|c| !c.is_empty()) {
            Some(column) => request
                .query(&[("on_conflict", column)])
                .header("Prefer", "resolution=merge-duplicates,return=minimal"),
            None => request.header("Prefer", "return=minimal"),
        };

        let resp = request.body(body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            tracing::debug!(table, status = status.as_u16(), %message, "PostgREST insert rejected");
            return Err(SupabaseError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}
