//! issuesite Search Library
//!
//! Builds the flat search index consumed by the site's client-side search.
//!
//! The index is rebuilt from the full article set on every run and written
//! as a single JSON array of [`SearchIndexEntry`] records.
//!
//! # Example
//!
//! ```no_run
//! use issuesite_core::SiteConfig;
//! use issuesite_parser::MarkdownRenderer;
//! use issuesite_search::SearchIndex;
//!
//! let config = SiteConfig::with_title("Notes");
//! let renderer = MarkdownRenderer::default();
//! let index = SearchIndex::build(&[], &config, &renderer);
//! let json = index.to_json().unwrap();
//! assert_eq!(json, "[]");
//! ```

pub mod excerpt;
pub mod index;

pub use excerpt::excerpt;
pub use index::{SearchIndex, SearchIndexEntry};
use thiserror::Error;

/// Search-related errors.
#[derive(Debug, Error)]
pub enum SearchError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;
