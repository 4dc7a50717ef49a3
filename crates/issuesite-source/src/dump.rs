//! Offline source backed by a JSON dump of the issues listing.

use std::path::Path;

use async_trait::async_trait;

use crate::{IssueSource, PageQuery, RawIssue, Result, SourceError, StateFilter, raw::IssueState};

/// Serves a saved issues listing with the same paging rules as the API.
#[derive(Debug, Clone, Default)]
pub struct DumpSource {
    issues: Vec<RawIssue>,
}

impl DumpSource {
    /// Wrap in-memory issues.
    pub fn from_issues(mut issues: Vec<RawIssue>) -> Self {
        issues.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.number.cmp(&b.number)));
        Self { issues }
    }

    /// Read a JSON array of issues in the tracker's wire format.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| SourceError::Dump {
            path: path.to_path_buf(),
            source,
        })?;
        let issues: Vec<RawIssue> = serde_json::from_str(&content)
            .map_err(|e| SourceError::Parse(format!("{}: {e}", path.display())))?;
        Ok(Self::from_issues(issues))
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

#[async_trait]
impl IssueSource for DumpSource {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<RawIssue>> {
        let per_page = query.per_page.max(1) as usize;
        let skip = (query.page.max(1) as usize - 1) * per_page;

        Ok(self
            .issues
            .iter()
            .filter(|i| query.state == StateFilter::All || i.state == IssueState::Open)
            .filter(|i| query.since.is_none_or(|since| i.updated_at >= since))
            .skip(skip)
            .take(per_page)
            .cloned()
            .collect())
    }
}
