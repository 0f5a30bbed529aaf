use anyhow::{Context, Result};
use apify_client::{ApifyClient, InstagramPost};
use async_trait::async_trait;
use chrono::Utc;
use sift_common::RawCandidate;
use tracing::{info, warn};

use super::CandidateSource;

/// Instagram posts scraped through Apify, by hashtag and by profile.
pub struct ApifySource {
    client: ApifyClient,
    hashtags: Vec<String>,
    profiles: Vec<String>,
    limit: u32,
}

impl ApifySource {
    pub fn new(client: ApifyClient, hashtags: Vec<String>, profiles: Vec<String>, limit: u32) -> Self {
        Self {
            client,
            hashtags,
            profiles,
            limit,
        }
    }
}

/// A post without a usable key becomes a candidate with no source id and is
/// counted as malformed downstream.
pub fn post_to_candidate(post: InstagramPost) -> RawCandidate {
    RawCandidate {
        source_id: post.key().map(str::to_string),
        media: post.media_urls(),
        user_name: post.owner_username.clone(),
        full_name: None,
        fetched_at: post.timestamp.unwrap_or_else(Utc::now),
        text: post.caption,
        tags: post.hashtags,
        source: "instagram".to_string(),
    }
}

#[async_trait]
impl CandidateSource for ApifySource {
    fn name(&self) -> &str {
        "apify"
    }

    async fn fetch(&self) -> Result<Vec<RawCandidate>> {
        let mut posts = Vec::new();

        if !self.hashtags.is_empty() {
            let found = self
                .client
                .scrape_instagram_hashtags(&self.hashtags, self.limit)
                .await
                .context("Apify hashtag scrape failed")?;
            posts.extend(found);
        }

        for profile in &self.profiles {
            match self.client.scrape_instagram_profile(profile, self.limit).await {
                Ok(found) => posts.extend(found),
                Err(e) => warn!(profile, error = %e, "Profile scrape failed, skipping"),
            }
        }

        info!(posts = posts.len(), "Apify fetch complete");
        Ok(posts.into_iter().map(post_to_candidate).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(json: serde_json::Value) -> InstagramPost {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn maps_post_fields() {
        let c = post_to_candidate(post(serde_json::json!({
            "id": "3141",
            "shortCode": "Cx1",
            "url": "https://www.instagram.com/p/Cx1/",
            "caption": "Sunrise on the trail",
            "ownerUsername": "trail_tom",
            "hashtags": ["hiking"],
            "displayUrl": "https://cdn.example/1.jpg",
            "timestamp": "2024-05-01T12:00:00Z"
        })));

        assert_eq!(c.source_id.as_deref(), Some("Cx1"));
        assert_eq!(c.text.as_deref(), Some("Sunrise on the trail"));
        assert_eq!(c.tags, vec!["hiking"]);
        assert_eq!(c.media, vec!["https://cdn.example/1.jpg"]);
        assert_eq!(c.source, "instagram");
        assert_eq!(c.user_name.as_deref(), Some("trail_tom"));
        assert_eq!(c.fetched_at.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn keyless_post_has_no_source_id() {
        let c = post_to_candidate(post(serde_json::json!({ "caption": "orphan" })));
        assert_eq!(c.source_id, None);
    }
}
