use std::sync::Arc;

use sift_common::{CandidateRecord, MatchResult};
use tracing::debug;

use crate::cleaner::{normalize_tags, normalize_text};
use crate::ruleset::KeywordRuleset;

/// Screens candidates against the keyword ruleset.
#[derive(Clone)]
pub struct FilterEngine {
    ruleset: Arc<KeywordRuleset>,
}

impl FilterEngine {
    pub fn new(ruleset: Arc<KeywordRuleset>) -> Self {
        Self { ruleset }
    }

    /// Normalize the candidate the same way the cleaner will, then evaluate.
    pub fn screen(&self, candidate: &CandidateRecord) -> MatchResult {
        let text = normalize_text(candidate.text());
        let tags = normalize_tags(candidate.tags(), &text);
        let result = self.ruleset.evaluate(&text, &tags);

        debug!(
            id = candidate.source_id(),
            accepted = result.accepted,
            rules = ?result.matched_rules,
            "Screened candidate"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ruleset::KeywordRule;
    use crate::testing::candidate;

    fn engine() -> FilterEngine {
        let ruleset = KeywordRuleset::new(vec![KeywordRule::new("hiking", &["hiking"]).unwrap()])
            .unwrap();
        FilterEngine::new(Arc::new(ruleset))
    }

    #[test]
    fn accepts_on_raw_tag_after_normalization() {
        let result = engine().screen(&candidate("a1", "Weekend plans", &["#HIKING"]));
        assert!(result.accepted);
        assert_eq!(result.matched_rules, vec!["hiking"]);
    }

    #[test]
    fn accepts_decorated_text() {
        assert!(engine().screen(&candidate("a2", "ʜɪᴋɪɴɢ   day", &[])).accepted);
    }

    #[test]
    fn rejects_unrelated_candidate() {
        let result = engine().screen(&candidate("b2", "Just a random update", &[]));
        assert!(!result.accepted);
        assert!(result.matched_rules.is_empty());
    }
}
