//! Durable record of what was last rendered.
//!
//! The cache is a single JSON file read at the start of a run and written
//! back atomically at the end. An entry is only recorded after its page was
//! written, so a crash leaves the cache behind the output tree, never ahead.

use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};

use issuesite_core::CacheEntry;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::writer::write_atomic;

/// Current on-disk format version.
pub const CACHE_VERSION: u32 = 1;

/// Cache persistence errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache file exists but cannot be read.
    #[error("cannot read cache {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The cache file cannot be written.
    #[error("cannot write cache {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Serialization error.
    #[error("cannot serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
    #[serde(default)]
    entries: BTreeMap<u64, CacheEntry>,
}

/// The cache, open for one run.
///
/// Pending changes are flushed when the store is dropped, so early returns
/// and failures still persist the entries recorded so far.
#[derive(Debug)]
pub struct CacheStore {
    path: PathBuf,
    fingerprint: Option<String>,
    entries: BTreeMap<u64, CacheEntry>,
    dirty: bool,
}

impl CacheStore {
    /// Open the cache at `path`.
    ///
    /// A missing file is an empty cache. A file that does not parse, or has
    /// an unknown version, is logged and treated as empty; it is left on disk
    /// until the next commit replaces it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut store = Self {
            path,
            fingerprint: None,
            entries: BTreeMap::new(),
            dirty: false,
        };

        let content = match std::fs::read_to_string(&store.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %store.path.display(), "no cache yet");
                return Ok(store);
            }
            Err(source) => {
                return Err(CacheError::Read {
                    path: store.path.clone(),
                    source,
                });
            }
        };

        match serde_json::from_str::<CacheFile>(&content) {
            Ok(file) if file.version == CACHE_VERSION => {
                store.fingerprint = file.fingerprint;
                store.entries = file.entries;
                debug!(
                    path = %store.path.display(),
                    entries = store.entries.len(),
                    "loaded cache"
                );
            }
            Ok(file) => {
                warn!(
                    path = %store.path.display(),
                    version = file.version,
                    "unsupported cache version, starting from an empty cache"
                );
            }
            Err(e) => {
                warn!(
                    path = %store.path.display(),
                    error = %e,
                    "corrupt cache, starting from an empty cache"
                );
            }
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &BTreeMap<u64, CacheEntry> {
        &self.entries
    }

    pub fn get(&self, id: u64) -> Option<&CacheEntry> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fingerprint of the rendering setup the entries were produced with.
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn set_fingerprint(&mut self, fingerprint: impl Into<String>) {
        let fingerprint = fingerprint.into();
        if self.fingerprint.as_deref() != Some(fingerprint.as_str()) {
            self.fingerprint = Some(fingerprint);
            self.dirty = true;
        }
    }

    /// Record a successful render.
    pub fn record(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.id, entry);
        self.dirty = true;
    }

    /// Forget an article whose page was removed.
    pub fn remove(&mut self, id: u64) -> Option<CacheEntry> {
        let removed = self.entries.remove(&id);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the cache atomically if anything changed.
    pub fn commit(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let file = CacheFile {
            version: CACHE_VERSION,
            fingerprint: self.fingerprint.clone(),
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        write_atomic(&self.path, json.as_bytes()).map_err(|source| CacheError::Write {
            path: self.path.clone(),
            source,
        })?;

        self.dirty = false;
        debug!(path = %self.path.display(), entries = self.entries.len(), "cache committed");
        Ok(())
    }
}

impl Drop for CacheStore {
    fn drop(&mut self) {
        if self.dirty
            && let Err(e) = self.commit()
        {
            warn!(error = %e, "failed to flush cache");
        }
    }
}
