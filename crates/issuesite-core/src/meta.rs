//! Metadata lines embedded at the top of issue bodies.
//!
//! Authors can put `!vml-summary <span>...</span>` or
//! `!vml-title <span>...</span>` within the first few lines of an issue to
//! control how its card is shown on the listing.

use std::sync::LazyLock;

use regex::Regex;

/// Only this many leading lines are scanned for metadata.
pub const META_SCAN_LINES: usize = 5;

const META_PREFIX: &str = "!vml-";

static SPAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<span[^>]*>(.*?)</span>").expect("span pattern is valid"));

/// Card metadata and the body with metadata lines removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueMeta {
    /// Card summary, if given.
    pub summary: Option<String>,

    /// Vertical title for the card, if given.
    pub vertical_title: Option<String>,

    /// Body without metadata lines, trimmed.
    pub body: String,
}

/// Split `!vml-` metadata lines off the top of an issue body.
///
/// A metadata line must start with `!vml-` and carry a `<span>`; lines that
/// start with the prefix but have no span stay in the body.
pub fn extract_issue_meta(body: &str) -> IssueMeta {
    let mut meta = IssueMeta::default();
    let mut kept = Vec::new();

    for (i, line) in body.split('\n').enumerate() {
        if i < META_SCAN_LINES {
            let trimmed = line.trim();
            if trimmed.starts_with(META_PREFIX)
                && let Some(caps) = SPAN_RE.captures(trimmed)
            {
                let value = caps[1].trim().to_string();

                // The key may sit anywhere on the line, including span attributes.
                if trimmed.contains("summary") {
                    meta.summary = Some(value);
                } else if trimmed.contains("title") {
                    meta.vertical_title = Some(value);
                }
                continue;
            }
        }
        kept.push(line);
    }

    meta.body = kept.join("\n").trim().to_string();
    meta
}
