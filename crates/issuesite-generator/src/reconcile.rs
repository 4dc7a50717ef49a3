//! Change detection against the cache.
//!
//! Classification compares content hashes only. Timestamps are ignored so
//! metadata-only touches and clock skew never cause a re-render.

use std::collections::{BTreeMap, BTreeSet};

use issuesite_core::{Article, CacheEntry};
use tracing::{debug, warn};

/// Result of diffing the fetched articles against the cache.
///
/// Every id from either side lands in exactly one of the four sets.
#[derive(Debug, Default)]
pub struct Reconciliation<'a> {
    /// Not in the cache.
    pub new: Vec<&'a Article>,
    /// In the cache with a different hash.
    pub updated: Vec<&'a Article>,
    /// In the cache but no longer fetched.
    pub deleted: Vec<u64>,
    /// In the cache with the same hash.
    pub unchanged: Vec<u64>,
}

impl<'a> Reconciliation<'a> {
    /// Articles that need a page written, new first.
    pub fn changed(&self) -> impl Iterator<Item = &'a Article> + '_ {
        self.new.iter().chain(self.updated.iter()).copied()
    }

    /// Nothing to write or remove.
    pub fn is_noop(&self) -> bool {
        self.new.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Move unchanged articles matching `pred` to `updated`.
    ///
    /// Used when their pages must be rewritten for reasons outside the
    /// article itself, like a missing file or a new render setup. Returns
    /// how many were promoted.
    pub fn promote_unchanged(
        &mut self,
        current: &'a [Article],
        mut pred: impl FnMut(&Article) -> bool,
    ) -> usize {
        let by_id: BTreeMap<u64, &'a Article> = current.iter().map(|a| (a.id, a)).collect();
        let before = self.unchanged.len();

        self.unchanged.retain(|id| match by_id.get(id) {
            Some(&article) if pred(article) => {
                self.updated.push(article);
                false
            }
            _ => true,
        });
        self.updated.sort_by_key(|a| a.id);

        before - self.unchanged.len()
    }
}

/// Classify each article as new, updated, deleted, or unchanged.
///
/// `current` should hold each id once; if an id repeats, the first copy is
/// used and the rest are ignored. All output lists are sorted by id.
pub fn reconcile<'a>(
    current: &'a [Article],
    cached: &BTreeMap<u64, CacheEntry>,
) -> Reconciliation<'a> {
    let mut result = Reconciliation::default();
    let mut seen = BTreeSet::new();

    for article in current {
        if !seen.insert(article.id) {
            warn!(id = article.id, "duplicate article id, ignoring later copy");
            continue;
        }

        match cached.get(&article.id) {
            None => result.new.push(article),
            Some(entry) if entry.content_hash != article.content_hash => {
                result.updated.push(article)
            }
            Some(_) => result.unchanged.push(article.id),
        }
    }

    result.deleted = cached
        .keys()
        .filter(|id| !seen.contains(id))
        .copied()
        .collect();

    result.new.sort_by_key(|a| a.id);
    result.updated.sort_by_key(|a| a.id);
    result.unchanged.sort_unstable();

    debug!(
        new = result.new.len(),
        updated = result.updated.len(),
        deleted = result.deleted.len(),
        unchanged = result.unchanged.len(),
        "reconciled"
    );
    result
}
