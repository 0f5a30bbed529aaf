//! Normalization of accepted candidates into upload-ready records.
//!
//! Everything here is pure: the same candidate always cleans to the same
//! record, stable identifier and content hash included.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use sift_common::{CandidateRecord, CleanRecord, MatchResult};

static RE_HASHTAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#([\p{L}\p{N}_]+)").unwrap());

/// Decorative small-capital letters folded to plain ASCII.
const SMALL_CAPS: &[(char, char)] = &[
    ('ᴀ', 'a'),
    ('ʙ', 'b'),
    ('ᴄ', 'c'),
    ('ᴅ', 'd'),
    ('ᴇ', 'e'),
    ('ꜰ', 'f'),
    ('ɢ', 'g'),
    ('ʜ', 'h'),
    ('ɪ', 'i'),
    ('ᴊ', 'j'),
    ('ᴋ', 'k'),
    ('ʟ', 'l'),
    ('ᴍ', 'm'),
    ('ɴ', 'n'),
    ('ᴏ', 'o'),
    ('ᴘ', 'p'),
    ('ǫ', 'q'),
    ('ʀ', 'r'),
    ('ꜱ', 's'),
    ('ᴛ', 't'),
    ('ᴜ', 'u'),
    ('ᴠ', 'v'),
    ('ᴡ', 'w'),
    ('ʏ', 'y'),
    ('ᴢ', 'z'),
];

fn fold_char(c: char) -> char {
    SMALL_CAPS
        .iter()
        .find(|(styled, _)| *styled == c)
        .map(|(_, plain)| *plain)
        .unwrap_or(c)
}

/// Fold decorative letters, trim, and collapse whitespace runs to one space.
pub fn normalize_text(text: &str) -> String {
    let folded: String = text.chars().map(fold_char).collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_tag(tag: &str) -> Option<String> {
    let tag = normalize_text(tag);
    let tag = tag.trim_start_matches('#').trim();
    if tag.is_empty() {
        None
    } else {
        Some(tag.to_lowercase())
    }
}

/// Case-folded, deduplicated tag set: the raw tags plus any inline
/// `#hashtags` found in `text`.
pub fn normalize_tags<S: AsRef<str>>(tags: &[S], text: &str) -> BTreeSet<String> {
    let inline = RE_HASHTAG
        .captures_iter(text)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()));

    tags.iter()
        .map(|t| t.as_ref().to_string())
        .chain(inline)
        .filter_map(|t| normalize_tag(&t))
        .collect()
}

/// The stable identifier is the trimmed source identifier.
pub fn stable_id(candidate: &CandidateRecord) -> String {
    candidate.source_id().trim().to_string()
}

/// SHA-256 over the normalized content, hex encoded.
pub fn content_hash(text: &str, tags: &BTreeSet<String>, media: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    for tag in tags {
        hasher.update([0x1f]);
        hasher.update(tag.as_bytes());
    }
    for url in media {
        hasher.update([0x1e]);
        hasher.update(url.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Normalize an accepted candidate. Never rejects.
pub fn clean(candidate: &CandidateRecord, matched: &MatchResult) -> CleanRecord {
    let text = normalize_text(candidate.text());
    let tags = normalize_tags(candidate.tags(), &text);
    let media: Vec<String> = candidate
        .media()
        .iter()
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();
    let content_hash = content_hash(&text, &tags, &media);
    let profile_field = |v: Option<&str>| Some(normalize_text(v?)).filter(|v| !v.is_empty());

    CleanRecord {
        id: stable_id(candidate),
        text,
        tags,
        media,
        user_name: profile_field(candidate.user_name()),
        full_name: profile_field(candidate.full_name()),
        matched_rules: matched.matched_rules.clone(),
        content_hash,
        source: candidate.source().to_string(),
        fetched_at: candidate.fetched_at(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{candidate, raw};

    #[test]
    fn collapses_and_trims_whitespace() {
        assert_eq!(normalize_text("  Great \t #hiking\n\n trip  "), "Great #hiking trip");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn folds_small_capitals() {
        assert_eq!(normalize_text("ʜɪᴋɪɴɢ ᴛʀɪᴘ"), "hiking trip");
    }

    #[test]
    fn tags_are_case_folded_and_deduplicated() {
        let tags = normalize_tags(&["Hiking", "#hiking", " TRAIL ", "", "#"], "");
        assert_eq!(
            tags.into_iter().collect::<Vec<_>>(),
            vec!["hiking".to_string(), "trail".to_string()]
        );
    }

    #[test]
    fn inline_hashtags_join_the_tag_set() {
        let tags = normalize_tags::<&str>(&[], "Sunset #Camping at the #lake_side");
        assert!(tags.contains("camping"));
        assert!(tags.contains("lake_side"));
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn clean_produces_canonical_record() {
        let c = candidate("a1", "  Great   #hiking trip ", &["hiking"]);
        let record = clean(&c, &MatchResult::from_matches(vec!["hiking".into()]));

        assert_eq!(record.id, "a1");
        assert_eq!(record.text, "Great #hiking trip");
        assert_eq!(record.tags.iter().collect::<Vec<_>>(), vec!["hiking"]);
        assert_eq!(record.matched_rules, vec!["hiking"]);
        assert_eq!(record.content_hash.len(), 64);
    }

    #[test]
    fn cleaning_is_idempotent() {
        let c = candidate("a1", "Great #hiking trip", &["Hiking", "outdoors"]);
        let m = MatchResult::from_matches(vec!["hiking".into()]);
        assert_eq!(clean(&c, &m), clean(&c, &m));
        assert_eq!(clean(&c, &m).id, clean(&c.clone(), &m).id);
    }

    #[test]
    fn hash_changes_with_content() {
        let m = MatchResult::from_matches(vec!["hiking".into()]);
        let a = clean(&candidate("a1", "hiking", &[]), &m);
        let b = clean(&candidate("a1", "hiking!", &[]), &m);
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn profile_names_are_normalized_and_blanks_dropped() {
        let mut source = raw("a1", "Great #hiking trip", &["hiking"]);
        source.user_name = Some("  trail_tom ".into());
        source.full_name = Some(" \t ".into());
        let record = clean(
            &CandidateRecord::from_raw(source).unwrap(),
            &MatchResult::from_matches(vec!["hiking".into()]),
        );

        assert_eq!(record.user_name.as_deref(), Some("trail_tom"));
        assert_eq!(record.full_name, None);
    }
}
