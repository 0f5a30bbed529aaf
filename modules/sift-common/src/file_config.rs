use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// TOML-backed configuration loaded from disk.
/// Secrets (backend key, Apify token) stay as env vars.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub keywords: KeywordsConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeywordsConfig {
    /// Directory of `*.txt` keyword lists, one rule per file.
    pub dir: Option<PathBuf>,
    /// Additional single rule files.
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub rules: Vec<InlineRule>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InlineRule {
    pub name: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/ledger.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct UploadConfig {
    pub table: String,
    /// Conflict column for upserts. Empty means plain insert.
    pub on_conflict: String,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            table: "instagram_accounts_staging".to_string(),
            on_conflict: "id".to_string(),
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineConfig {
    pub concurrency: usize,
    pub interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            interval_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Instagram profile export in CSV form.
    Csv { path: PathBuf },
    /// Apify Instagram scrapes.
    Apify {
        #[serde(default)]
        hashtags: Vec<String>,
        #[serde(default)]
        profiles: Vec<String>,
        #[serde(default = "default_results_limit")]
        limit: u32,
    },
}

fn default_results_limit() -> u32 {
    50
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(content)?;
    if config.upload.max_attempts == 0 {
        anyhow::bail!("upload.max_attempts must be at least 1");
    }
    if config.pipeline.concurrency == 0 {
        anyhow::bail!("pipeline.concurrency must be at least 1");
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let config = parse_config(
            r#"
            [keywords]
            dir = "./keywords"

            [source]
            kind = "csv"
            path = "./export.csv"
            "#,
        )
        .unwrap();

        assert_eq!(config.upload.max_attempts, 4);
        assert_eq!(config.upload.table, "instagram_accounts_staging");
        assert_eq!(config.pipeline.concurrency, 4);
        assert_eq!(config.ledger.path, PathBuf::from("./data/ledger.db"));
        assert!(matches!(config.source, SourceConfig::Csv { .. }));
    }

    #[test]
    fn apify_source_with_inline_rules() {
        let config = parse_config(
            r##"
            [keywords]
            rules = [{ name = "hiking", keywords = ["hiking", "#trail"] }]

            [source]
            kind = "apify"
            hashtags = ["hiking"]
            "##,
        )
        .unwrap();

        assert_eq!(config.keywords.rules.len(), 1);
        match config.source {
            SourceConfig::Apify { hashtags, limit, .. } => {
                assert_eq!(hashtags, vec!["hiking"]);
                assert_eq!(limit, 50);
            }
            other => panic!("unexpected source: {other:?}"),
        }
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = parse_config(
            r#"
            [keywords]
            dir = "./keywords"
            colour = "blue"

            [source]
            kind = "csv"
            path = "./export.csv"
            "#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let err = parse_config(
            r#"
            [keywords]
            dir = "./keywords"

            [upload]
            max_attempts = 0

            [source]
            kind = "csv"
            path = "./export.csv"
            "#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn load_config_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sift.toml");
        std::fs::write(
            &path,
            "[keywords]\ndir = \"k\"\n[source]\nkind = \"csv\"\npath = \"x.csv\"\n",
        )
        .unwrap();
        assert!(load_config(&path).is_ok());
        assert!(load_config(&dir.path().join("missing.toml")).is_err());
    }
}
