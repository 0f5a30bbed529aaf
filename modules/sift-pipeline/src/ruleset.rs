//! Keyword ruleset: named keyword lists loaded once at startup.
//!
//! A rule matches when any keyword is a substring of the normalized text or
//! equals one of the normalized tags, ignoring case. Rules compose with OR;
//! there is no precedence between them.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use sift_common::file_config::KeywordsConfig;
use sift_common::MatchResult;
use thiserror::Error;
use tracing::{debug, info};

pub type Result<T> = std::result::Result<T, RulesetError>;

#[derive(Debug, Error)]
pub enum RulesetError {
    #[error("keyword path not found: {0}")]
    Missing(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rule '{0}' has no keywords")]
    EmptyRule(String),

    #[error("rule name '{0}' is defined more than once")]
    DuplicateRule(String),

    #[error("no keyword rules configured")]
    NoRules,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRule {
    name: String,
    keywords: Vec<String>,
}

impl KeywordRule {
    /// Keywords are trimmed, lower-cased and stripped of a leading `#`;
    /// blanks and repeats are dropped.
    pub fn new<S: AsRef<str>>(name: impl Into<String>, keywords: &[S]) -> Result<Self> {
        let name = name.into();
        let mut seen = HashSet::new();
        let keywords: Vec<String> = keywords
            .iter()
            .map(|k| k.as_ref().trim().trim_start_matches('#').trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .filter(|k| seen.insert(k.clone()))
            .collect();

        if keywords.is_empty() {
            return Err(RulesetError::EmptyRule(name));
        }
        Ok(Self { name, keywords })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// `text` is expected lower-cased, `tags` case-folded.
    fn matches(&self, text: &str, tags: &BTreeSet<String>) -> bool {
        self.keywords
            .iter()
            .any(|k| text.contains(k.as_str()) || tags.contains(k))
    }
}

/// Immutable set of keyword rules.
#[derive(Debug, Clone)]
pub struct KeywordRuleset {
    rules: Vec<KeywordRule>,
}

impl KeywordRuleset {
    /// Build from rules, rejecting an empty set and repeated names.
    pub fn new(rules: Vec<KeywordRule>) -> Result<Self> {
        if rules.is_empty() {
            return Err(RulesetError::NoRules);
        }
        let mut names = HashSet::new();
        for rule in &rules {
            if !names.insert(rule.name.as_str()) {
                return Err(RulesetError::DuplicateRule(rule.name.clone()));
            }
        }
        Ok(Self { rules })
    }

    /// Load every source named in the keywords config. Fails on the first
    /// missing, unreadable or empty source.
    pub fn load(config: &KeywordsConfig, base_dir: &Path) -> Result<Self> {
        let mut rules = Vec::new();

        if let Some(dir) = &config.dir {
            rules.extend(load_dir(&base_dir.join(dir))?);
        }
        for file in &config.files {
            rules.push(load_file(&base_dir.join(file))?);
        }
        for inline in &config.rules {
            rules.push(KeywordRule::new(inline.name.clone(), &inline.keywords)?);
        }

        let ruleset = Self::new(rules)?;
        info!(
            rules = ruleset.len(),
            keywords = ruleset.rules.iter().map(|r| r.keywords.len()).sum::<usize>(),
            "Keyword ruleset loaded"
        );
        Ok(ruleset)
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Which rules fire for already-normalized text and tags.
    pub fn evaluate(&self, text: &str, tags: &BTreeSet<String>) -> MatchResult {
        let text = text.to_lowercase();
        let tags: BTreeSet<String> = tags.iter().map(|t| t.to_lowercase()).collect();

        let matched: Vec<String> = self
            .rules
            .iter()
            .filter(|rule| rule.matches(&text, &tags))
            .map(|rule| rule.name.clone())
            .collect();

        MatchResult::from_matches(matched)
    }
}

/// Parse a keyword list: one keyword per line, `#` starts a comment line.
fn parse_keywords(content: &str) -> Vec<&str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

/// One rule from one file, named by the file stem.
pub fn load_file(path: &Path) -> Result<KeywordRule> {
    if !path.exists() {
        return Err(RulesetError::Missing(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| RulesetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let rule = KeywordRule::new(name, &parse_keywords(&content))?;
    debug!(rule = rule.name(), keywords = rule.keywords.len(), path = %path.display(), "Loaded rule file");
    Ok(rule)
}

/// One rule per `*.txt` file in `dir`, in file-name order.
pub fn load_dir(dir: &Path) -> Result<Vec<KeywordRule>> {
    if !dir.is_dir() {
        return Err(RulesetError::Missing(dir.to_path_buf()));
    }
    let io_err = |source| RulesetError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            paths.push(path);
        }
    }
    paths.sort();

    paths.iter().map(|p| load_file(p)).collect()
}
