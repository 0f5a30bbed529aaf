use std::path::PathBuf;

use sift_common::file_config::{load_config, SourceConfig};
use sift_pipeline::KeywordRuleset;

fn config_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config")
}

#[test]
fn shipped_config_and_keywords_load() {
    let dir = config_dir();
    let config = load_config(&dir.join("sift.toml")).unwrap();
    assert!(matches!(config.source, SourceConfig::Csv { .. }));

    let ruleset = KeywordRuleset::load(&config.keywords, &dir).unwrap();
    let names: Vec<_> = ruleset.rules().iter().map(|r| r.name()).collect();
    assert_eq!(names, vec!["camping", "hiking", "climbing"]);
}
