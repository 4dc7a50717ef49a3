//! Issue records in the tracker's wire format.

use chrono::{DateTime, Utc};
use issuesite_core::{Article, ArticleState, ClosedPolicy};
use serde::{Deserialize, Serialize};

/// Upstream open/closed state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    #[default]
    Open,
    Closed,
}

/// A label as returned by the REST API, or a bare name in hand-written dumps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawLabel {
    Named { name: String },
    Plain(String),
}

impl RawLabel {
    pub fn name(&self) -> &str {
        match self {
            Self::Named { name } | Self::Plain(name) => name,
        }
    }
}

/// One item from the issues listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawIssue {
    /// Issue number; stable within a repository.
    pub number: u64,

    pub title: String,

    #[serde(default)]
    pub body: Option<String>,

    #[serde(default)]
    pub labels: Vec<RawLabel>,

    #[serde(default)]
    pub state: IssueState,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Present on pull requests, which share the issues listing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<serde_json::Value>,
}

impl RawIssue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    /// Normalize into an [`Article`].
    ///
    /// Returns `None` for pull requests and for closed issues under the delete policy.
    pub fn into_article(self, policy: ClosedPolicy) -> Option<Article> {
        if self.is_pull_request() {
            return None;
        }

        let state = match (self.state, policy) {
            (IssueState::Open, _) => ArticleState::Published,
            (IssueState::Closed, ClosedPolicy::Archive) => ArticleState::Archived,
            (IssueState::Closed, ClosedPolicy::Delete) => return None,
        };

        let labels = self.labels.iter().map(|l| l.name().to_string());
        Some(Article::new(
            self.number,
            self.title.trim(),
            self.body.as_deref().unwrap_or_default().replace("\r\n", "\n"),
            labels.collect::<Vec<_>>(),
            self.created_at,
            self.updated_at,
            state,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUE_JSON: &str = r#"{
        "id": 1234567,
        "number": 42,
        "title": " Hello ",
        "body": "line one\r\nline two",
        "labels": [{"id": 1, "name": "rust", "color": "dea584"}, "notes"],
        "state": "closed",
        "comments": 3,
        "created_at": "2024-01-02T03:04:05Z",
        "updated_at": "2024-02-03T04:05:06Z"
    }"#;

    #[test]
    fn test_parse_wire_format() {
        let issue: RawIssue = serde_json::from_str(ISSUE_JSON).expect("parse issue");

        assert_eq!(issue.number, 42);
        assert_eq!(issue.state, IssueState::Closed);
        assert_eq!(issue.labels[0].name(), "rust");
        assert_eq!(issue.labels[1].name(), "notes");
        assert!(!issue.is_pull_request());
    }

    #[test]
    fn test_into_article_archive() {
        let issue: RawIssue = serde_json::from_str(ISSUE_JSON).expect("parse issue");
        let article = issue.into_article(ClosedPolicy::Archive).expect("archived article");

        assert_eq!(article.id, 42);
        assert_eq!(article.title, "Hello");
        assert_eq!(article.body, "line one\nline two");
        assert!(article.labels.contains("rust"));
        assert_eq!(article.state, ArticleState::Archived);
    }

    #[test]
    fn test_into_article_delete_drops_closed() {
        let issue: RawIssue = serde_json::from_str(ISSUE_JSON).expect("parse issue");
        assert!(issue.into_article(ClosedPolicy::Delete).is_none());
    }

    #[test]
    fn test_pull_requests_are_skipped() {
        let json = r#"{
            "number": 7, "title": "PR", "body": null, "state": "open",
            "created_at": "2024-01-02T03:04:05Z", "updated_at": "2024-01-02T03:04:05Z",
            "pull_request": {"url": "https://api.github.com/repos/o/r/pulls/7"}
        }"#;
        let issue: RawIssue = serde_json::from_str(json).expect("parse pr");

        assert!(issue.is_pull_request());
        assert!(issue.into_article(ClosedPolicy::Archive).is_none());
    }
}
