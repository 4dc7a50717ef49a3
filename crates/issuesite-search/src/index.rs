//! Flat JSON search index.
//!
//! The whole index is loaded into memory by the browser, so it only carries
//! what the results list shows: id, title, excerpt, labels, and url.

use std::{collections::HashSet, fs, path::Path};

use issuesite_core::{Article, SiteConfig, meta::extract_issue_meta};
use issuesite_parser::MarkdownRenderer;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Result, SearchError, excerpt::excerpt, excerpt::is_cjk_char};

/// Maximum recommended size for the index (500KB).
pub const MAX_INDEX_SIZE: usize = 500 * 1024;

/// One searchable article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIndexEntry {
    pub id: u64,

    pub title: String,

    /// Word-boundary excerpt of the plain-text body.
    pub excerpt: String,

    pub labels: Vec<String>,

    /// Page URL, relative unless the site has a base URL.
    pub url: String,

    /// Closed upstream and kept as an archive.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub archived: bool,
}

/// The full index, serialized as one JSON array ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchIndex {
    entries: Vec<SearchIndexEntry>,
}

impl SearchIndex {
    /// Build the index from the full current article set.
    ///
    /// Deterministic: entries are ordered by id and labels are sorted.
    pub fn build(articles: &[Article], config: &SiteConfig, renderer: &MarkdownRenderer) -> Self {
        let mut entries: Vec<SearchIndexEntry> = articles
            .iter()
            .map(|article| {
                let meta = extract_issue_meta(&article.body);
                let text = renderer.plain_text(&meta.body);
                SearchIndexEntry {
                    id: article.id,
                    title: article.title.clone(),
                    excerpt: excerpt(&text, config.search.excerpt_chars),
                    labels: article.labels.iter().cloned().collect(),
                    url: config.url_for(&article.output_path(config.build.slug)),
                    archived: article.is_archived(),
                }
            })
            .collect();
        entries.sort_by_key(|e| e.id);

        info!(entries = entries.len(), "built search index");
        Self { entries }
    }

    pub fn entries(&self) -> &[SearchIndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize the index to JSON.
    pub fn to_json(&self) -> Result<String> {
        let json = serde_json::to_string(self)
            .map_err(|e| SearchError::Serialization(e.to_string()))?;

        if json.len() > MAX_INDEX_SIZE {
            tracing::warn!(
                size = json.len(),
                max = MAX_INDEX_SIZE,
                "search index exceeds recommended size"
            );
        }
        Ok(json)
    }

    /// Deserialize an index from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SearchError::Serialization(e.to_string()))
    }

    /// Read a previously written index.
    pub fn read_from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| SearchError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Search the index the way the client does.
    ///
    /// Returns entries matching all query terms (AND search), title matches
    /// first, then by id.
    pub fn search(&self, query: &str) -> Vec<&SearchIndexEntry> {
        let query_terms = tokenize_text(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<(usize, &SearchIndexEntry)> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let title_terms: HashSet<String> = tokenize_text(&entry.title).into_iter().collect();
                let mut terms = title_terms.clone();
                terms.extend(tokenize_text(&entry.excerpt));
                terms.extend(entry.labels.iter().map(|l| normalize_term(l)));

                query_terms
                    .iter()
                    .all(|t| terms.contains(t))
                    .then(|| {
                        let in_title = query_terms.iter().filter(|t| title_terms.contains(*t)).count();
                        (in_title, entry)
                    })
            })
            .collect();

        hits.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.id.cmp(&b.1.id)));
        hits.into_iter().map(|(_, entry)| entry).collect()
    }
}

/// Tokenize text into normalized terms.
/// Supports both space-separated languages (English) and CJK languages (Chinese, Japanese, Korean).
fn tokenize_text(text: &str) -> Vec<String> {
    let mut terms = Vec::new();

    // Word-based terms for space-separated languages
    for word in text.split(|c: char| !c.is_alphanumeric() || is_cjk_char(c)) {
        if word.chars().count() >= 2 {
            terms.push(normalize_term(word));
        }
    }

    // CJK characters and bigrams
    let chars: Vec<char> = text.chars().filter(|c| is_cjk_char(*c)).collect();
    for c in &chars {
        terms.push(c.to_string());
    }
    for pair in chars.windows(2) {
        terms.push(pair.iter().collect());
    }

    terms.sort();
    terms.dedup();
    terms
}

/// Normalize a term (lowercase, trim).
fn normalize_term(term: &str) -> String {
    term.to_lowercase().trim().to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use issuesite_core::{ArticleState, SlugStyle};

    use super::*;

    fn article(id: u64, title: &str, body: &str, labels: &[&str]) -> Article {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Article::new(
            id,
            title,
            body,
            labels.iter().map(|l| l.to_string()),
            ts,
            ts,
            ArticleState::Published,
        )
    }

    fn build(articles: &[Article]) -> SearchIndex {
        let mut config = SiteConfig::with_title("Test");
        config.search.excerpt_chars = 40;
        SearchIndex::build(articles, &config, &MarkdownRenderer::default())
    }

    #[test]
    fn test_tokenize_text() {
        let terms = tokenize_text("Hello World! This is a test.");
        assert!(terms.contains(&"hello".to_string()));
        assert!(terms.contains(&"world".to_string()));
        assert!(terms.contains(&"test".to_string()));
        // Single character "a" should be filtered out
        assert!(!terms.contains(&"a".to_string()));
    }

    #[test]
    fn test_tokenize_chinese() {
        let terms = tokenize_text("你好世界");
        assert!(terms.contains(&"你".to_string()));
        assert!(terms.contains(&"界".to_string()));
        assert!(terms.contains(&"你好".to_string()));
        assert!(terms.contains(&"世界".to_string()));
    }

    #[test]
    fn test_build_entries() {
        let articles = vec![
            article(
                2,
                "Second",
                "!vml-summary <span>hidden</span>\n# Heading\n\nSome **markdown** text that goes on for quite a while longer",
                &["rust", "notes"],
            ),
            article(1, "First", "Short body", &[]),
        ];
        let index = build(&articles);

        assert_eq!(index.len(), 2);
        let first = &index.entries()[0];
        assert_eq!(first.id, 1);
        assert_eq!(first.url, "articles/1.html");
        assert_eq!(first.excerpt, "Short body");

        let second = &index.entries()[1];
        assert_eq!(second.labels, vec!["notes", "rust"]);
        assert_eq!(second.excerpt, "Heading Some markdown text that goes on...");
        assert!(!second.excerpt.contains("hidden"));
    }

    #[test]
    fn test_url_uses_slug_and_base_url() {
        let mut config = SiteConfig::with_title("Test");
        config.build.slug = SlugStyle::Title;
        config.site.base_url = "https://example.com/blog".to_string();

        let index = SearchIndex::build(
            &[article(3, "Hello World", "", &[])],
            &config,
            &MarkdownRenderer::default(),
        );
        assert_eq!(
            index.entries()[0].url,
            "https://example.com/blog/articles/hello-world.html"
        );
    }

    #[test]
    fn test_json_is_flat_array() {
        let index = build(&[article(1, "A", "b c", &["x"])]);
        let json = index.to_json().unwrap();

        assert_eq!(
            json,
            r#"[{"id":1,"title":"A","excerpt":"b c","labels":["x"],"url":"articles/1.html"}]"#
        );
        assert_eq!(SearchIndex::from_json(&json).unwrap(), index);
    }

    #[test]
    fn test_archived_flag_serialized() {
        let mut closed = article(1, "Old", "gone", &[]);
        closed.state = ArticleState::Archived;
        let json = build(&[closed]).to_json().unwrap();
        assert!(json.contains("\"archived\":true"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let articles = vec![article(2, "B", "two", &["y", "x"]), article(1, "A", "one", &[])];
        let mut reversed = articles.clone();
        reversed.reverse();

        assert_eq!(
            build(&articles).to_json().unwrap(),
            build(&reversed).to_json().unwrap()
        );
    }

    #[test]
    fn test_search() {
        let index = build(&[
            article(1, "Learning Go", "Go programming tutorial about rust-free code", &["go"]),
            article(2, "Learning Rust", "Rust programming tutorial", &["rust"]),
            article(3, "学习笔记", "今天学习了搜索", &[]),
        ]);

        let results = index.search("rust");
        assert_eq!(results.iter().map(|e| e.id).collect::<Vec<_>>(), vec![2, 1]);

        let results = index.search("programming tutorial");
        assert_eq!(results.len(), 2);

        assert!(index.search("python").is_empty());
        assert!(index.search("").is_empty());
        assert_eq!(index.search("学习")[0].id, 3);
    }

    #[test]
    fn test_read_from_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("search-index.json");
        let index = build(&[article(1, "A", "b", &[])]);
        std::fs::write(&path, index.to_json().unwrap()).expect("write index");

        assert_eq!(SearchIndex::read_from_file(&path).unwrap(), index);
        assert!(matches!(
            SearchIndex::read_from_file(&dir.path().join("missing.json")),
            Err(SearchError::Io(_))
        ));
    }
}
