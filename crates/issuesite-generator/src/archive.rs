//! Raw markdown archive.
//!
//! Keeps the source of every published article as `<dir>/<id>.md`, outside
//! the output tree. Files follow the pages: an archive file is written only
//! after its page was, and removed with it.

use std::{
    collections::BTreeSet,
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::writer::write_atomic;

/// Directory of `<id>.md` files.
#[derive(Debug, Clone)]
pub struct MarkdownArchive {
    dir: PathBuf,
}

impl MarkdownArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: u64) -> PathBuf {
        self.dir.join(format!("{id}.md"))
    }

    pub fn exists(&self, id: u64) -> bool {
        self.path_for(id).is_file()
    }

    /// Write the markdown for one article.
    pub fn store(&self, id: u64, markdown: &str) -> io::Result<()> {
        write_atomic(&self.path_for(id), markdown.as_bytes())?;
        debug!(id, "archived markdown");
        Ok(())
    }

    /// Remove one article's markdown. A file that is already gone counts as removed.
    pub fn remove(&self, id: u64) -> io::Result<()> {
        match fs::remove_file(self.path_for(id)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    /// Remove `<id>.md` files for ids not in `live`. Other files are left alone.
    ///
    /// Returns the removed ids in ascending order.
    pub fn sweep(&self, live: &BTreeSet<u64>) -> io::Result<Vec<u64>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut stale: Vec<u64> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|name| name.strip_suffix(".md")?.parse().ok())
            .filter(|id| !live.contains(id))
            .collect();
        stale.sort_unstable();

        for &id in &stale {
            self.remove(id)?;
            info!(id, "removed orphaned markdown");
        }
        Ok(stale)
    }
}
