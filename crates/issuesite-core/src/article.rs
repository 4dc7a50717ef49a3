//! Normalized article model and change-detection hashing.

use std::{collections::BTreeSet, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::SlugStyle;

/// Directory inside the output tree that holds article pages.
pub const ARTICLES_DIR: &str = "articles";

/// Publication state of an article.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleState {
    /// Open upstream.
    #[default]
    Published,
    /// Closed upstream and kept under the archive policy.
    Archived,
}

/// Hex-encoded SHA-256 digest over the fields that affect rendered output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash title, body, and labels.
    ///
    /// Labels are hashed in sorted order so the digest does not depend on the
    /// order the tracker returned them in. Each field is length-prefixed so
    /// moving text between fields changes the digest.
    pub fn compute<'a>(
        title: &str,
        body: &str,
        labels: impl IntoIterator<Item = &'a String>,
    ) -> Self {
        let labels: BTreeSet<&String> = labels.into_iter().collect();

        let mut hasher = Sha256::new();
        write_field(&mut hasher, b"title", title.as_bytes());
        write_field(&mut hasher, b"body", body.as_bytes());
        hasher.update((labels.len() as u64).to_le_bytes());
        for label in labels {
            write_field(&mut hasher, b"label", label.as_bytes());
        }

        Self(hex::encode(hasher.finalize()))
    }

    /// Digest as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ContentHash {
    fn from(value: String) -> Self {
        Self(value)
    }
}

fn write_field(hasher: &mut Sha256, tag: &[u8], value: &[u8]) {
    hasher.update(tag);
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value);
}

/// One issue, normalized for publishing.
///
/// Articles are rebuilt from the source every run; only their hash outlives
/// the run, inside the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Stable identifier from the tracker (the issue number).
    pub id: u64,

    /// Issue title.
    pub title: String,

    /// Markdown body as written upstream.
    pub body: String,

    /// Label names.
    pub labels: BTreeSet<String>,

    /// Creation time upstream.
    pub created_at: DateTime<Utc>,

    /// Last modification time upstream.
    pub updated_at: DateTime<Utc>,

    /// Published or archived.
    pub state: ArticleState,

    /// Digest of title, body, and labels. Set by [`Article::new`].
    pub content_hash: ContentHash,
}

impl Article {
    /// Create an article, computing its content hash.
    pub fn new(
        id: u64,
        title: impl Into<String>,
        body: impl Into<String>,
        labels: impl IntoIterator<Item = String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        state: ArticleState,
    ) -> Self {
        let title = title.into();
        let body = body.into();
        let labels: BTreeSet<String> = labels.into_iter().collect();
        let content_hash = ContentHash::compute(&title, &body, &labels);

        Self {
            id,
            title,
            body,
            labels,
            created_at,
            updated_at,
            state,
            content_hash,
        }
    }

    /// File stem of this article's page.
    pub fn slug(&self, style: SlugStyle) -> String {
        match style {
            SlugStyle::Id => self.id.to_string(),
            SlugStyle::Title => {
                let slug = slugify(&self.title);
                if slug.is_empty() {
                    self.id.to_string()
                } else {
                    slug
                }
            }
        }
    }

    /// Path of this article's page relative to the output root, with `/` separators.
    pub fn output_path(&self, style: SlugStyle) -> String {
        article_path(&self.slug(style))
    }

    pub fn is_archived(&self) -> bool {
        self.state == ArticleState::Archived
    }
}

/// Relative output path for a slug.
pub fn article_path(slug: &str) -> String {
    format!("{ARTICLES_DIR}/{slug}.html")
}

/// Lowercase a title into a URL-safe slug.
///
/// Alphanumeric characters (including non-Latin scripts) are kept, runs of
/// anything else collapse into a single `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn article(title: &str, body: &str, tags: &[&str]) -> Article {
        Article::new(
            7,
            title,
            body,
            labels(tags),
            ts(1),
            ts(2),
            ArticleState::Published,
        )
    }

    #[test]
    fn test_hash_ignores_label_order() {
        let a = ContentHash::compute("T", "B", &labels(&["rust", "notes"]));
        let b = ContentHash::compute("T", "B", &labels(&["notes", "rust"]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_changes_with_each_field() {
        let base = article("Title", "Body", &["rust"]);
        assert_ne!(base.content_hash, article("Title!", "Body", &["rust"]).content_hash);
        assert_ne!(base.content_hash, article("Title", "Body!", &["rust"]).content_hash);
        assert_ne!(base.content_hash, article("Title", "Body", &["go"]).content_hash);
        assert_ne!(base.content_hash, article("Title", "Body", &[]).content_hash);
    }

    #[test]
    fn test_hash_field_boundaries() {
        let a = ContentHash::compute("ab", "c", &[]);
        let b = ContentHash::compute("a", "bc", &[]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_ignores_metadata() {
        let a = article("Title", "Body", &["rust"]);
        let b = Article::new(
            a.id,
            "Title",
            "Body",
            labels(&["rust"]),
            ts(5),
            ts(9),
            ArticleState::Archived,
        );
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = ContentHash::compute("T", "B", &[]);
        assert_eq!(hash.as_str().len(), 64);
        assert!(hash.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_serializes_as_string() {
        let hash = ContentHash::from("abc123".to_string());
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, "\"abc123\"");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust   2024 edition "), "rust-2024-edition");
        assert_eq!(slugify("中文 标题"), "中文-标题");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_output_path() {
        let a = article("Hello World", "", &[]);
        assert_eq!(a.output_path(SlugStyle::Id), "articles/7.html");
        assert_eq!(a.output_path(SlugStyle::Title), "articles/hello-world.html");

        let untitled = article("???", "", &[]);
        assert_eq!(untitled.output_path(SlugStyle::Title), "articles/7.html");
    }
}
