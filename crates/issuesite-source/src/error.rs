//! Fetch error types.

use std::{path::PathBuf, sync::Arc};

/// Errors raised while fetching issues.
///
/// Any of these reaching the pipeline aborts the run before the output tree
/// or the cache is touched.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Repository is not in `owner/name` form.
    #[error("invalid repository {0:?}: expected owner/name")]
    InvalidRepo(String),

    /// Credentials were rejected.
    #[error("authentication failed: HTTP {status}")]
    Auth { status: u16 },

    /// The tracker asked us to slow down.
    #[error("rate limited by the issue tracker")]
    RateLimited,

    /// HTTP error response.
    #[error("HTTP error: {status}")]
    Http { status: u16 },

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response body could not be decoded.
    #[error("malformed response: {0}")]
    Parse(String),

    /// Issue dump could not be read.
    #[error("failed to read issue dump {}: {source}", path.display())]
    Dump {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A page kept failing after every retry.
    #[error("page {page} failed after {attempts} attempts: {last}")]
    Exhausted {
        page: u32,
        attempts: u32,
        #[source]
        last: Box<SourceError>,
    },
}

impl SourceError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited | Self::Timeout | Self::Network(_) => true,
            Self::Http { status } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout
        } else {
            SourceError::Network(Arc::new(err))
        }
    }
}
