//! Cache record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::article::ContentHash;

/// What was last successfully rendered for one article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Article id.
    pub id: u64,

    /// Hash of the article as it was rendered.
    pub content_hash: ContentHash,

    /// When the page was written.
    pub last_rendered_at: DateTime<Utc>,

    /// Page path relative to the output root.
    pub output_path: String,
}

impl CacheEntry {
    pub fn new(
        id: u64,
        content_hash: ContentHash,
        last_rendered_at: DateTime<Utc>,
        output_path: impl Into<String>,
    ) -> Self {
        Self {
            id,
            content_hash,
            last_rendered_at,
            output_path: output_path.into(),
        }
    }
}
