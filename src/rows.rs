//! Reshaping of raw search records into the fixed-shape rows written to the sheets.

use std::collections::HashSet;
use std::hash::Hash;

use crate::search::RawRecord;

pub const NO_TITLE: &str = "No Title";
pub const NO_LINK: &str = "No Link";
pub const NO_SNIPPET: &str = "No Snippet";

pub const NEWS_HEADER: [&str; 4] = ["Title", "Link", "Snippet", "Meta Description"];
pub const TREND_HEADER: [&str; 2] = ["Query", "Value"];

/// A news or top-stories row. Every field is always populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsRow {
    pub title: String,
    pub link: String,
    pub snippet: String,
    /// Filled in by enrichment; empty until then.
    pub description: String,
}

impl NewsRow {
    /// Map a raw record, replacing missing or empty fields with their placeholders.
    pub fn from_record(record: &RawRecord) -> Self {
        NewsRow {
            title: or_placeholder(record.title.as_deref(), NO_TITLE),
            link: or_placeholder(record.link.as_deref(), NO_LINK),
            snippet: or_placeholder(record.snippet.as_deref(), NO_SNIPPET),
            description: String::new(),
        }
    }

    pub fn into_cells(self) -> Vec<String> {
        vec![self.title, self.link, self.snippet, self.description]
    }
}

/// A trending-query row. Missing values stay `None` and are written as empty cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendRow {
    pub query: Option<String>,
    pub value: Option<String>,
}

impl TrendRow {
    pub fn from_record(record: &RawRecord) -> Self {
        TrendRow {
            query: record.query.clone(),
            value: record.value_text(),
        }
    }

    pub fn into_cells(self) -> Vec<String> {
        vec![self.query.unwrap_or_default(), self.value.unwrap_or_default()]
    }
}

fn or_placeholder(value: Option<&str>, placeholder: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => placeholder.to_string(),
    }
}

/// Keep the first row for each key, in input order, stopping once `keep_n` rows are kept.
///
/// The cap is a hard stop: nothing after the `keep_n`-th kept row is looked at.
pub fn dedupe_by_key<T, K, F>(rows: impl IntoIterator<Item = T>, key: F, keep_n: usize) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    if keep_n == 0 {
        return out;
    }
    for row in rows {
        if seen.insert(key(&row)) {
            out.push(row);
            if out.len() >= keep_n {
                break;
            }
        }
    }
    out
}

/// Normalize news/story records and dedupe them by link.
pub fn normalize_news(records: &[RawRecord], cap: usize) -> Vec<NewsRow> {
    let rows: Vec<NewsRow> = records.iter().map(NewsRow::from_record).collect();
    let raw_count = rows.len();
    let unique_links = rows.iter().map(|r| r.link.as_str()).collect::<HashSet<_>>().len();
    let kept = dedupe_by_key(rows, |r| r.link.clone(), cap);
    tracing::debug!(raw = raw_count, unique_links, kept = kept.len(), cap, "normalized news rows");
    kept
}

/// Map trend records without dedup and keep the first `cap`.
pub fn normalize_trends(records: &[RawRecord], cap: usize) -> Vec<TrendRow> {
    records.iter().take(cap).map(TrendRow::from_record).collect()
}
