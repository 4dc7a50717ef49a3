//! GitHub REST issues source.

use std::time::Duration;

use async_trait::async_trait;
use issuesite_core::config::SourceConfig;
use reqwest::{StatusCode, header};

use crate::{IssueSource, PageQuery, RawIssue, Result, SourceError};

/// Default user agent; GitHub rejects requests without one.
const USER_AGENT: &str = concat!("issuesite/", env!("CARGO_PKG_VERSION"));

const API_VERSION: &str = "2022-11-28";

/// Issues listing of one GitHub repository.
#[derive(Debug, Clone)]
pub struct GitHubSource {
    http: reqwest::Client,
    api_base: String,
    repo: String,
    token: Option<String>,
}

impl GitHubSource {
    /// Create a source for `owner/name` on the given API base.
    pub fn new(
        api_base: &str,
        repo: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut parts = repo.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {}
            _ => return Err(SourceError::InvalidRepo(repo.to_string())),
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Create a source from configuration, reading the token from `token_env`.
    ///
    /// A missing token is allowed; public repositories can be read
    /// anonymously at a lower rate limit.
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env).ok();
        if token.is_none() {
            tracing::warn!(
                env = %config.token_env,
                "no API token set, using unauthenticated requests"
            );
        }
        Self::with_token(config, token)
    }

    /// Create a source from configuration with an explicit token.
    pub fn with_token(config: &SourceConfig, token: Option<String>) -> Result<Self> {
        Self::new(
            &config.api_base,
            &config.repo,
            token,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn issues_url(&self) -> String {
        format!("{}/repos/{}/issues", self.api_base, self.repo)
    }

    fn query_params(query: &PageQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("state", query.state.as_str().to_string()),
            ("sort", "created".to_string()),
            ("direction", "asc".to_string()),
            ("per_page", query.per_page.to_string()),
            ("page", query.page.to_string()),
        ];
        if let Some(since) = query.since {
            params.push(("since", since.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)));
        }
        params
    }
}

#[async_trait]
impl IssueSource for GitHubSource {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<RawIssue>> {
        let mut request = self
            .http
            .get(self.issues_url())
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .query(&Self::query_params(query));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!(page = query.page, %status, "issues response");

        let exhausted_quota = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            == Some("0");

        match status {
            StatusCode::TOO_MANY_REQUESTS => return Err(SourceError::RateLimited),
            StatusCode::FORBIDDEN if exhausted_quota => return Err(SourceError::RateLimited),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SourceError::Auth {
                    status: status.as_u16(),
                });
            }
            s if s.is_client_error() || s.is_server_error() => {
                return Err(SourceError::Http {
                    status: status.as_u16(),
                });
            }
            _ => {}
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| SourceError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::StateFilter;

    fn source() -> GitHubSource {
        GitHubSource::new(
            "https://api.github.com/",
            "octo/notes",
            None,
            Duration::from_secs(5),
        )
        .expect("valid source")
    }

    #[test]
    fn test_issues_url() {
        assert_eq!(
            source().issues_url(),
            "https://api.github.com/repos/octo/notes/issues"
        );
    }

    #[test]
    fn test_query_params_are_stable_order() {
        let query = PageQuery {
            page: 2,
            per_page: 50,
            since: Some(Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()),
            state: StateFilter::All,
        };
        let params = GitHubSource::query_params(&query);

        assert!(params.contains(&("state", "all".to_string())));
        assert!(params.contains(&("sort", "created".to_string())));
        assert!(params.contains(&("direction", "asc".to_string())));
        assert!(params.contains(&("per_page", "50".to_string())));
        assert!(params.contains(&("page", "2".to_string())));
        assert!(params.contains(&("since", "2024-05-06T07:08:09Z".to_string())));
    }

    #[test]
    fn test_invalid_repo() {
        for repo in ["", "octo", "octo/", "/notes", "a/b/c"] {
            let result = GitHubSource::new("https://api.github.com", repo, None, Duration::ZERO);
            assert!(
                matches!(result, Err(SourceError::InvalidRepo(_))),
                "{repo:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_empty_token_is_ignored() {
        let source = GitHubSource::new(
            "https://api.github.com",
            "octo/notes",
            Some(String::new()),
            Duration::from_secs(1),
        )
        .expect("valid source");
        assert!(!source.has_token());
    }

    #[test]
    fn test_with_token_uses_config() {
        let config = SourceConfig {
            repo: "octo/notes".to_string(),
            api_base: "https://github.example.com/api/v3/".to_string(),
            ..Default::default()
        };

        let source = GitHubSource::with_token(&config, Some("secret".to_string())).expect("source");
        assert!(source.has_token());
        assert_eq!(
            source.issues_url(),
            "https://github.example.com/api/v3/repos/octo/notes/issues"
        );

        let anonymous = GitHubSource::with_token(&config, None).expect("source");
        assert!(!anonymous.has_token());
    }

    #[test]
    fn test_with_token_rejects_bad_repo() {
        let config = SourceConfig {
            repo: "not-a-repo".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            GitHubSource::with_token(&config, None),
            Err(SourceError::InvalidRepo(_))
        ));
    }
}
