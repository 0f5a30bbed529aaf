use std::env;

use crate::error::{Result, SiftError};

/// Secrets loaded from environment variables. Tunables live in the TOML
/// [`FileConfig`](crate::FileConfig).
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Backend
    pub supabase_url: String,
    pub supabase_service_key: String,

    // Scraping
    pub apify_api_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            supabase_url: required_env("SUPABASE_URL")?,
            supabase_service_key: required_env("SUPABASE_SERVICE_KEY")?,
            apify_api_key: env::var("APIFY_API_KEY").ok().filter(|v| !v.is_empty()),
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => preview(v),
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  SUPABASE_URL: {}", self.supabase_url);
        tracing::info!("  SUPABASE_SERVICE_KEY: {}", preview(&self.supabase_service_key));
        tracing::info!("  APIFY_API_KEY: {}", preview_opt(&self.apify_api_key));
    }
}

fn required_env(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(SiftError::Config(format!(
            "{key} environment variable is required"
        ))),
    }
}

/// First five characters of a secret plus its length, for startup logs.
fn preview(val: &str) -> String {
    let head: String = val.chars().take(5).collect();
    format!("{head}...({} chars)", val.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_shows_a_short_prefix() {
        assert_eq!(preview("eyJhbGciOi"), "eyJhb...(10 chars)");
        assert_eq!(preview("abc"), "abc...(3 chars)");
    }

    #[test]
    fn preview_does_not_split_multibyte_characters() {
        assert_eq!(preview("clé-ÿøü-secret"), "clé-ÿ...(14 chars)");
        assert_eq!(preview("🔑🔑🔑🔑🔑🔑"), "🔑🔑🔑🔑🔑...(6 chars)");
    }

    #[test]
    fn missing_variable_is_a_config_error() {
        let err = required_env("SIFT_TEST_DEFINITELY_UNSET_VARIABLE").unwrap_err();
        assert!(matches!(err, SiftError::Config(ref m) if m.contains("SIFT_TEST_DEFINITELY_UNSET_VARIABLE")));
    }
}
