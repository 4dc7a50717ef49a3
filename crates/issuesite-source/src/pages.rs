//! Paginated fetching with bounded retries.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{IssueSource, RawIssue, Result, SourceError};

/// Which upstream states to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFilter {
    Open,
    All,
}

impl StateFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::All => "all",
        }
    }
}

/// Parameters of a single page request.
///
/// Items are always requested oldest-created first so page boundaries stay
/// valid while the remote list changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    /// 1-based page number.
    pub page: u32,
    pub per_page: u32,
    /// Only items updated at or after this time.
    pub since: Option<DateTime<Utc>>,
    pub state: StateFilter,
}

/// Exponential backoff for failed page requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based).
    pub fn delay(&self, retry: u32) -> Duration {
        self.initial_backoff.saturating_mul(2u32.saturating_pow(retry))
    }
}

/// Lazy cursor over the pages of an issue listing.
///
/// Each call to [`IssuePages::next`] requests one page. A page that fails
/// after all retries is reported without advancing the cursor, so calling
/// `next` again retries that same page.
#[derive(Debug)]
pub struct IssuePages<'a, S: ?Sized> {
    source: &'a S,
    query: PageQuery,
    retry: RetryPolicy,
    done: bool,
}

impl<'a, S: IssueSource + ?Sized> IssuePages<'a, S> {
    pub fn new(source: &'a S, query: PageQuery, retry: RetryPolicy) -> Self {
        Self {
            source,
            query,
            retry,
            done: false,
        }
    }

    /// Continue from the given 1-based page.
    pub fn resume_from(mut self, page: u32) -> Self {
        self.query.page = page.max(1);
        self.done = false;
        self
    }

    /// Query the next request will be built from.
    pub fn query(&self) -> &PageQuery {
        &self.query
    }

    /// Page the next call to `next` will request.
    pub fn next_page(&self) -> u32 {
        self.query.page
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Fetch the next page, or `None` once the listing is exhausted.
    pub async fn next(&mut self) -> Option<Result<Vec<RawIssue>>> {
        if self.done {
            return None;
        }

        match self.fetch_with_retry().await {
            Ok(items) => {
                // A short page is the last one.
                if items.len() < self.query.per_page as usize {
                    self.done = true;
                }
                self.query.page += 1;
                if items.is_empty() { None } else { Some(Ok(items)) }
            }
            Err(e) => Some(Err(e)),
        }
    }

    async fn fetch_with_retry(&self) -> Result<Vec<RawIssue>> {
        let mut retry = 0;
        loop {
            match self.source.fetch_page(&self.query).await {
                Ok(items) => {
                    debug!(page = self.query.page, items = items.len(), "fetched page");
                    return Ok(items);
                }
                Err(e) if e.is_retryable() && retry < self.retry.max_retries => {
                    let delay = self.retry.delay(retry);
                    warn!(
                        page = self.query.page,
                        attempt = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "page request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => {
                    return Err(SourceError::Exhausted {
                        page: self.query.page,
                        attempts: retry + 1,
                        last: Box::new(e),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use async_trait::async_trait;
    use chrono::TimeZone;

    use super::*;
    use crate::raw::IssueState;

    /// Replays canned responses in order.
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<Vec<RawIssue>>>>,
        requested: Mutex<Vec<u32>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Vec<RawIssue>>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requested: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<u32> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl IssueSource for ScriptedSource {
        async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<RawIssue>> {
            self.requested.lock().unwrap().push(query.page);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn issue(number: u64) -> RawIssue {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        RawIssue {
            number,
            title: format!("Issue {number}"),
            body: Some("body".to_string()),
            labels: Vec::new(),
            state: IssueState::Open,
            created_at: ts,
            updated_at: ts,
            pull_request: None,
        }
    }

    fn query(per_page: u32) -> PageQuery {
        PageQuery {
            page: 1,
            per_page,
            since: None,
            state: StateFilter::Open,
        }
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_millis(1000));
        assert_eq!(policy.delay(3), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn test_pages_until_short_page() {
        let source = ScriptedSource::new(vec![
            Ok(vec![issue(1), issue(2)]),
            Ok(vec![issue(3), issue(4)]),
            Ok(vec![issue(5)]),
        ]);
        let mut pages = IssuePages::new(&source, query(2), fast_retry(0));

        let mut numbers = Vec::new();
        while let Some(page) = pages.next().await {
            numbers.extend(page.expect("page").into_iter().map(|i| i.number));
        }

        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert_eq!(source.requested(), vec![1, 2, 3]);
        assert!(pages.is_done());
    }

    #[tokio::test]
    async fn test_full_last_page_needs_empty_followup() {
        let source = ScriptedSource::new(vec![Ok(vec![issue(1), issue(2)]), Ok(Vec::new())]);
        let mut pages = IssuePages::new(&source, query(2), fast_retry(0));

        assert!(pages.next().await.is_some());
        assert!(pages.next().await.is_none());
        assert_eq!(source.requested(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let source = ScriptedSource::new(vec![
            Err(SourceError::Http { status: 502 }),
            Err(SourceError::Timeout),
            Ok(vec![issue(1)]),
        ]);
        let mut pages = IssuePages::new(&source, query(10), fast_retry(3));

        let page = pages.next().await.expect("a page").expect("retried");
        assert_eq!(page.len(), 1);
        assert_eq!(source.requested(), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let source = ScriptedSource::new(vec![
            Err(SourceError::RateLimited),
            Err(SourceError::RateLimited),
            Err(SourceError::RateLimited),
        ]);
        let mut pages = IssuePages::new(&source, query(10), fast_retry(2));

        let err = pages.next().await.expect("an error").unwrap_err();
        assert!(matches!(
            err,
            SourceError::Exhausted {
                page: 1,
                attempts: 3,
                ..
            }
        ));
        assert_eq!(pages.next_page(), 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let source = ScriptedSource::new(vec![Err(SourceError::Auth { status: 401 })]);
        let mut pages = IssuePages::new(&source, query(10), fast_retry(5));

        let err = pages.next().await.expect("an error").unwrap_err();
        assert!(matches!(err, SourceError::Exhausted { attempts: 1, .. }));
        assert_eq!(source.requested(), vec![1]);
    }

    #[tokio::test]
    async fn test_resume_from_page() {
        let source = ScriptedSource::new(vec![Ok(vec![issue(9)])]);
        let mut pages = IssuePages::new(&source, query(10), fast_retry(0)).resume_from(4);

        assert_eq!(pages.next_page(), 4);
        let page = pages.next().await.expect("a page").expect("ok");
        assert_eq!(page[0].number, 9);
        assert_eq!(source.requested(), vec![4]);
    }
}
