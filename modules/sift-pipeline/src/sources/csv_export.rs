//! Instagram profile exports as produced by scraping bots: either `,` or `;`
//! separated, column names varying between tools, and a promotional footer
//! appended after the data rows.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sift_common::RawCandidate;
use tracing::{debug, info};

use super::CandidateSource;

const FOOTER_PREFIX: &str = "Found profiles count:";
const FOOTER_LABEL: &str = "IG DM BOT:";
const FREE_PLAN_BANNER: &str = "max on free plan";
/// Rows mentioning these anywhere in the first column are dropped.
const NOISE_MARKERS: &[&str] = &[
    "found profiles count:",
    "ig dm bot:",
    "socialdeck.ai",
    "max on free plan",
];

const ID_COLUMNS: &[&str] = &["id"];
const USER_NAME_COLUMNS: &[&str] = &["user_name"];
const FULL_NAME_COLUMNS: &[&str] = &["full_name"];
const TEXT_COLUMNS: &[&str] = &["caption", "bio", "biography"];
const TAG_COLUMNS: &[&str] = &["hashtags", "tags"];
const MEDIA_COLUMNS: &[&str] = &["displayUrl", "media"];

pub struct CsvExportSource {
    path: PathBuf,
}

impl CsvExportSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CandidateSource for CsvExportSource {
    fn name(&self) -> &str {
        "csv"
    }

    async fn fetch(&self) -> Result<Vec<RawCandidate>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read export: {}", self.path.display()))?;
        let candidates = parse_export(&content, Utc::now())
            .with_context(|| format!("Failed to parse export: {}", self.path.display()))?;
        info!(path = %self.path.display(), candidates = candidates.len(), "Read CSV export");
        Ok(candidates)
    }
}

/// `,` when the header line has strictly more commas than semicolons,
/// otherwise `;`.
pub fn detect_separator(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    let commas = header.matches(',').count();
    let semicolons = header.matches(';').count();
    if commas > semicolons {
        b','
    } else {
        b';'
    }
}

fn canonical_column(name: &str) -> &str {
    match name {
        "userName" | "login" => "user_name",
        "fullName" | "name" => "full_name",
        other => other,
    }
}

/// First row of the trailing footer; everything from here on is dropped.
fn is_footer(first_column: &str) -> bool {
    first_column.is_empty()
        || first_column == "nan"
        || first_column == FOOTER_LABEL
        || first_column.starts_with(FOOTER_PREFIX)
        || first_column.contains(FREE_PLAN_BANNER)
}

/// A single promotional row inside the data.
fn is_noise(first_column: &str) -> bool {
    let lower = first_column.to_lowercase();
    NOISE_MARKERS.iter().any(|m| lower.contains(m))
}

/// `0` and `nan` are export placeholders for "no value".
fn present(value: &str) -> Option<String> {
    let value = value.trim();
    match value {
        "" | "0" | "nan" | "NaN" => None,
        v => Some(v.to_string()),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

struct Columns {
    id: Option<usize>,
    user_name: Option<usize>,
    full_name: Option<usize>,
    text: Vec<usize>,
    tags: Option<usize>,
    media: Option<usize>,
}

impl Columns {
    fn locate(headers: &[String]) -> Self {
        let find = |names: &[&str]| headers.iter().position(|h| names.contains(&h.as_str()));
        Self {
            id: find(ID_COLUMNS),
            user_name: find(USER_NAME_COLUMNS),
            full_name: find(FULL_NAME_COLUMNS),
            text: headers
                .iter()
                .enumerate()
                .filter(|(_, h)| TEXT_COLUMNS.contains(&h.as_str()))
                .map(|(i, _)| i)
                .collect(),
            tags: find(TAG_COLUMNS),
            media: find(MEDIA_COLUMNS),
        }
    }
}

/// Parse a whole export into raw candidates, stopping at the footer.
pub fn parse_export(content: &str, fetched_at: DateTime<Utc>) -> Result<Vec<RawCandidate>> {
    let separator = detect_separator(content);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(separator)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .context("Export has no header row")?
        .iter()
        .map(|h| canonical_column(h).to_string())
        .collect();
    let columns = Columns::locate(&headers);
    debug!(separator = %(separator as char), ?headers, "Parsed export header");

    let mut candidates = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed CSV row {}", row + 2))?;
        let first = record.get(0).unwrap_or_default().trim();
        if is_footer(first) {
            debug!(row = row + 2, first, "Footer reached");
            break;
        }
        if is_noise(first) {
            debug!(row = row + 2, first, "Skipping promotional row");
            continue;
        }

        let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).and_then(present);

        let user_name = cell(columns.user_name);
        let full_name = cell(columns.full_name);
        let source_id = cell(columns.id).or_else(|| user_name.clone());
        let text_parts: Vec<String> = std::iter::once(full_name.clone())
            .chain(columns.text.iter().map(|&i| cell(Some(i))))
            .flatten()
            .collect();
        let text = Some(text_parts.join(" ")).filter(|t| !t.is_empty());

        candidates.push(RawCandidate {
            source_id,
            text,
            tags: cell(columns.tags).map(|v| split_list(&v)).unwrap_or_default(),
            media: cell(columns.media).map(|v| split_list(&v)).unwrap_or_default(),
            user_name,
            full_name,
            fetched_at,
            source: "csv".to_string(),
        });
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_semicolon_exports() {
        assert_eq!(detect_separator("userName;fullName;bio\n"), b';');
        assert_eq!(detect_separator("id,userName,fullName\n"), b',');
    }

    #[test]
    fn separator_tie_goes_to_semicolon() {
        assert_eq!(detect_separator("id,userName;fullName\n"), b';');
        assert_eq!(detect_separator("id\n"), b';');
    }

    #[test]
    fn promotional_row_is_dropped_without_ending_the_data() {
        let export = "userName,fullName\n\
                      a,Alpha\n\
                      Try https://socialdeck.ai,\n\
                      b,Beta\n";
        let rows = parse_export(export, Utc::now()).unwrap();
        let ids: Vec<_> = rows.iter().filter_map(|r| r.source_id.as_deref()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn renames_columns_and_strips_footer() {
        let export = "\
userName;fullName;bio;profileUrl
trail_tom;Tom Trails;Weekend #hiking;https://instagram.com/trail_tom
chef_ann;0;Cooking daily;https://instagram.com/chef_ann
Found profiles count: 2
IG DM BOT:;https://socialdeck.ai
";
        let rows = parse_export(export, Utc::now()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].source_id.as_deref(), Some("trail_tom"));
        assert_eq!(rows[0].text.as_deref(), Some("Tom Trails Weekend #hiking"));
        assert_eq!(rows[0].user_name.as_deref(), Some("trail_tom"));
        assert_eq!(rows[0].full_name.as_deref(), Some("Tom Trails"));
        assert_eq!(rows[1].full_name, None);
        assert_eq!(rows[1].source_id.as_deref(), Some("chef_ann"));
        assert_eq!(rows[1].text.as_deref(), Some("Cooking daily"));
        assert!(rows.iter().all(|r| r.source == "csv"));
    }

    #[test]
    fn id_column_wins_over_user_name() {
        let export = "id,login,name,hashtags,displayUrl\n\
                      a1,hiker,Hiker Joe,\"hiking, trail\",https://cdn.example/a1.jpg\n";
        let rows = parse_export(export, Utc::now()).unwrap();

        assert_eq!(rows[0].source_id.as_deref(), Some("a1"));
        assert_eq!(rows[0].tags, vec!["hiking", "trail"]);
        assert_eq!(rows[0].media, vec!["https://cdn.example/a1.jpg"]);
    }

    #[test]
    fn free_plan_banner_ends_the_data() {
        let export = "userName,fullName\n\
                      a,Alpha\n\
                      Export limited: 50 profiles max on free plan,\n\
                      b,Beta\n";
        let rows = parse_export(export, Utc::now()).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn nan_user_name_yields_no_id() {
        let export = "fullName,userName\nSomeone,nan\n";
        let rows = parse_export(export, Utc::now()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_id, None);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let source = CsvExportSource::new("/definitely/not/here.csv");
        assert!(source.fetch().await.is_err());
    }
}
