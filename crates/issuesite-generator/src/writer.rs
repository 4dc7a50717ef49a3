//! Output tree mutation.
//!
//! Pages are written before the listing and index that link to them, and
//! every file goes through a temp file and rename so readers never see a
//! half-written page. The listing and index are produced only once the page
//! writes are known, so they never link to a page that is not on disk. A
//! failed write is recorded and the rest of the plan still runs.

use std::{
    collections::BTreeSet,
    fmt, fs,
    io::{self, Write},
    path::{Component, Path, PathBuf},
};

use issuesite_core::article::ARTICLES_DIR;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::render::{HtmlDocument, LISTING_PATH, RenderedArticle};

/// Write `contents` to `path` through a temp file in the same directory.
///
/// Parent directories are created as needed.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut builder = tempfile::Builder::new();
    builder.prefix(".issuesite-");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o644));
    }

    let mut tmp = builder.tempfile_in(parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// A page to remove, as recorded in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedPage {
    pub id: u64,
    pub output_path: String,
}

/// The serialized search index and where it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFile {
    pub path: String,
    pub json: String,
}

/// Site-wide files rewritten on every run.
#[derive(Debug, Clone)]
pub struct SiteFiles {
    pub listing: HtmlDocument,
    pub index: Option<IndexFile>,
}

/// Article pages and deletions of one run.
#[derive(Debug, Clone, Copy)]
pub struct ApplyPlan<'a> {
    pub new: &'a [RenderedArticle],
    pub updated: &'a [RenderedArticle],
    pub deleted: &'a [DeletedPage],
    /// Output paths of every current article; anything else under
    /// `articles/` is an orphan.
    pub live_paths: &'a BTreeSet<String>,
}

/// What a failed operation was doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Write,
    Remove,
    Sweep,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Write => "write",
            Self::Remove => "remove",
            Self::Sweep => "sweep",
        })
    }
}

/// One file operation that did not succeed.
#[derive(Debug)]
pub struct WriteFailure {
    /// Path relative to the output root, or the full path of an archive file.
    pub path: String,
    /// Article the file belongs to, if any.
    pub id: Option<u64>,
    pub op: WriteOp,
    pub error: io::Error,
}

impl fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{} {} (#{id}): {}", self.op, self.path, self.error),
            None => write!(f, "{} {}: {}", self.op, self.path, self.error),
        }
    }
}

/// Outcome of [`OutputWriter::apply`].
#[derive(Debug, Default)]
pub struct WriteReport {
    /// Articles whose page was written.
    pub written: Vec<u64>,
    /// Deleted articles whose page is gone.
    pub removed: Vec<u64>,
    /// Stray article pages swept from the tree.
    pub orphans_removed: Vec<String>,
    pub listing_written: bool,
    pub index_written: bool,
    /// Articles left off the listing and index because their page is missing.
    pub unlisted: Vec<u64>,
    pub failures: Vec<WriteFailure>,
}

impl WriteReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Writes rendered output under a root directory.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    root: PathBuf,
}

impl OutputWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a relative output path.
    ///
    /// Returns `None` for paths that would escape the root.
    pub fn locate(&self, relative: &str) -> Option<PathBuf> {
        let path = Path::new(relative);
        let safe = !relative.is_empty()
            && path
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        safe.then(|| self.root.join(path))
    }

    /// Whether the page for a relative path exists.
    pub fn exists(&self, relative: &str) -> bool {
        self.locate(relative).is_some_and(|p| p.is_file())
    }

    /// Apply a plan to the output tree.
    ///
    /// Order: article pages, search index, listing, deletions, orphan sweep.
    /// `site_files` is called after the page writes with the ids whose page
    /// failed to write and is not on disk; the listing and index it returns
    /// must leave those out. If it fails, the previous listing and index
    /// stay in place.
    pub fn apply<F, E>(&self, plan: &ApplyPlan<'_>, site_files: F) -> WriteReport
    where
        F: FnOnce(&BTreeSet<u64>) -> Result<SiteFiles, E>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let mut report = WriteReport::default();

        let pages: Vec<&RenderedArticle> = plan.new.iter().chain(plan.updated).collect();
        let results: Vec<(u64, &str, io::Result<()>)> = pages
            .par_iter()
            .map(|page| {
                let path = page.document.path.as_str();
                (page.id, path, self.write(path, &page.document.contents))
            })
            .collect();

        let mut missing = BTreeSet::new();
        for (id, path, result) in results {
            match result {
                Ok(()) => {
                    debug!(id, path, "wrote article page");
                    report.written.push(id);
                }
                Err(error) => {
                    warn!(id, path, %error, "failed to write article page");
                    // An updated page that failed still has its old version.
                    if !self.exists(path) {
                        missing.insert(id);
                    }
                    report.failures.push(WriteFailure {
                        path: path.to_string(),
                        id: Some(id),
                        op: WriteOp::Write,
                        error,
                    });
                }
            }
        }
        report.unlisted = missing.iter().copied().collect();

        match site_files(&missing) {
            Ok(files) => self.write_site_files(&files, &mut report),
            Err(error) => {
                let error = io::Error::other(error);
                warn!(%error, "cannot produce listing, keeping the previous one");
                report.failures.push(WriteFailure {
                    path: LISTING_PATH.to_string(),
                    id: None,
                    op: WriteOp::Write,
                    error,
                });
            }
        }

        for page in plan.deleted {
            if plan.live_paths.contains(&page.output_path) {
                // Another current article owns this path now.
                debug!(id = page.id, path = %page.output_path, "path reused, keeping file");
                report.removed.push(page.id);
                continue;
            }
            match self.remove_article_page(&page.output_path) {
                Ok(()) => {
                    debug!(id = page.id, path = %page.output_path, "removed article page");
                    report.removed.push(page.id);
                }
                Err(error) => {
                    warn!(id = page.id, path = %page.output_path, %error, "failed to remove article page");
                    report.failures.push(WriteFailure {
                        path: page.output_path.clone(),
                        id: Some(page.id),
                        op: WriteOp::Remove,
                        error,
                    });
                }
            }
        }

        self.sweep_orphans(plan.live_paths, &mut report);

        info!(
            written = report.written.len(),
            removed = report.removed.len(),
            orphans = report.orphans_removed.len(),
            failures = report.failures.len(),
            "applied output"
        );
        report
    }

    fn write_site_files(&self, files: &SiteFiles, report: &mut WriteReport) {
        if let Some(index) = &files.index {
            match self.write(&index.path, index.json.as_bytes()) {
                Ok(()) => report.index_written = true,
                Err(error) => {
                    warn!(path = %index.path, %error, "failed to write search index");
                    report.failures.push(WriteFailure {
                        path: index.path.clone(),
                        id: None,
                        op: WriteOp::Write,
                        error,
                    });
                }
            }
        }

        match self.write(&files.listing.path, files.listing.contents.as_bytes()) {
            Ok(()) => report.listing_written = true,
            Err(error) => {
                warn!(path = %files.listing.path, %error, "failed to write listing");
                report.failures.push(WriteFailure {
                    path: files.listing.path.clone(),
                    id: None,
                    op: WriteOp::Write,
                    error,
                });
            }
        }
    }

    fn write(&self, relative: &str, contents: impl AsRef<[u8]>) -> io::Result<()> {
        let path = self.locate(relative).ok_or_else(|| unsafe_path(relative))?;
        write_atomic(&path, contents.as_ref())
    }

    /// Remove a page under `articles/`. A page that is already gone counts as removed.
    fn remove_article_page(&self, relative: &str) -> io::Result<()> {
        let in_articles = Path::new(relative)
            .parent()
            .is_some_and(|p| p == Path::new(ARTICLES_DIR));
        let path = self
            .locate(relative)
            .filter(|_| in_articles)
            .ok_or_else(|| unsafe_path(relative))?;

        match fs::remove_file(&path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn sweep_orphans(&self, live_paths: &BTreeSet<String>, report: &mut WriteReport) {
        let dir = self.root.join(ARTICLES_DIR);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return,
            Err(error) => {
                report.failures.push(WriteFailure {
                    path: ARTICLES_DIR.to_string(),
                    id: None,
                    op: WriteOp::Sweep,
                    error,
                });
                return;
            }
        };

        let mut orphans: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(".html"))
            .map(|name| format!("{ARTICLES_DIR}/{name}"))
            .filter(|relative| !live_paths.contains(relative))
            .collect();
        orphans.sort();

        for relative in orphans {
            match self.remove_article_page(&relative) {
                Ok(()) => {
                    info!(path = %relative, "removed orphaned page");
                    report.orphans_removed.push(relative);
                }
                Err(error) => {
                    warn!(path = %relative, %error, "failed to remove orphaned page");
                    report.failures.push(WriteFailure {
                        path: relative,
                        id: None,
                        op: WriteOp::Sweep,
                        error,
                    });
                }
            }
        }
    }
}

fn unsafe_path(relative: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("refusing to touch {relative:?} outside the article tree"),
    )
}

#[cfg(test)]
mod tests {
    use issuesite_core::ContentHash;

    use super::*;

    fn page(id: u64, contents: &str) -> RenderedArticle {
        RenderedArticle {
            id,
            content_hash: ContentHash::from(format!("h{id}")),
            document: HtmlDocument {
                path: format!("articles/{id}.html"),
                contents: contents.to_string(),
            },
            warnings: Vec::new(),
        }
    }

    fn listing() -> HtmlDocument {
        HtmlDocument {
            path: "index.html".to_string(),
            contents: "<ul></ul>".to_string(),
        }
    }

    /// Fixed listing, ignoring which pages are missing.
    fn static_site(_missing: &BTreeSet<u64>) -> io::Result<SiteFiles> {
        Ok(SiteFiles {
            listing: listing(),
            index: None,
        })
    }

    fn live(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    fn read(root: &Path, relative: &str) -> String {
        fs::read_to_string(root.join(relative)).expect("read output file")
    }

    #[test]
    fn test_write_atomic_creates_parents() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("a").join("b").join("file.txt");
        write_atomic(&path, b"hello").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");

        write_atomic(&path, b"bye").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "bye");

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "file.txt")
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind");
    }

    #[test]
    fn test_apply_writes_everything() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let writer = OutputWriter::new(dir.path());
        let new = [page(1, "one")];
        let updated = [page(2, "two")];
        let live_paths = live(&["articles/1.html", "articles/2.html"]);

        let report = writer.apply(
            &ApplyPlan {
                new: &new,
                updated: &updated,
                deleted: &[],
                live_paths: &live_paths,
            },
            |missing| {
                assert!(missing.is_empty());
                Ok::<_, io::Error>(SiteFiles {
                    listing: listing(),
                    index: Some(IndexFile {
                        path: "search-index.json".to_string(),
                        json: "[]".to_string(),
                    }),
                })
            },
        );

        assert!(report.is_clean());
        assert_eq!(report.written, vec![1, 2]);
        assert!(report.listing_written);
        assert!(report.index_written);
        assert_eq!(read(dir.path(), "articles/1.html"), "one");
        assert_eq!(read(dir.path(), "articles/2.html"), "two");
        assert_eq!(read(dir.path(), "index.html"), "<ul></ul>");
        assert_eq!(read(dir.path(), "search-index.json"), "[]");
    }

    #[test]
    fn test_deletes_and_sweeps_but_leaves_unrelated_files() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path();
        fs::create_dir_all(root.join("articles")).unwrap();
        fs::write(root.join("articles/1.html"), "keep").unwrap();
        fs::write(root.join("articles/2.html"), "deleted").unwrap();
        fs::write(root.join("articles/stray.html"), "orphan").unwrap();
        fs::write(root.join("articles/notes.txt"), "not a page").unwrap();
        fs::write(root.join("CNAME"), "example.com").unwrap();

        let writer = OutputWriter::new(root);
        let live_paths = live(&["articles/1.html"]);
        let deleted = [
            DeletedPage {
                id: 2,
                output_path: "articles/2.html".to_string(),
            },
            DeletedPage {
                id: 3,
                output_path: "articles/3.html".to_string(),
            },
        ];

        let report = writer.apply(
            &ApplyPlan {
                new: &[],
                updated: &[],
                deleted: &deleted,
                live_paths: &live_paths,
            },
            static_site,
        );

        assert!(report.is_clean(), "{:?}", report.failures);
        assert_eq!(report.removed, vec![2, 3]);
        assert_eq!(report.orphans_removed, vec!["articles/stray.html"]);
        assert!(!report.index_written);
        assert!(root.join("articles/1.html").exists());
        assert!(!root.join("articles/2.html").exists());
        assert!(!root.join("articles/stray.html").exists());
        assert!(root.join("articles/notes.txt").exists());
        assert!(root.join("CNAME").exists());
    }

    #[test]
    fn test_reused_path_is_not_deleted() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let writer = OutputWriter::new(dir.path());
        let new = [RenderedArticle {
            document: HtmlDocument {
                path: "articles/hello.html".to_string(),
                contents: "new owner".to_string(),
            },
            ..page(5, "")
        }];
        let deleted = [DeletedPage {
            id: 4,
            output_path: "articles/hello.html".to_string(),
        }];
        let live_paths = live(&["articles/hello.html"]);

        let report = writer.apply(
            &ApplyPlan {
                new: &new,
                updated: &[],
                deleted: &deleted,
                live_paths: &live_paths,
            },
            static_site,
        );

        assert_eq!(report.removed, vec![4]);
        assert_eq!(read(dir.path(), "articles/hello.html"), "new owner");
    }

    #[test]
    fn test_refuses_paths_outside_articles() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path().join("site");
        fs::create_dir_all(&root).unwrap();
        fs::write(dir.path().join("precious.txt"), "x").unwrap();
        fs::write(root.join("index.html"), "x").unwrap();

        let writer = OutputWriter::new(&root);
        let deleted = [
            DeletedPage {
                id: 1,
                output_path: "../precious.txt".to_string(),
            },
            DeletedPage {
                id: 2,
                output_path: "search-index.json".to_string(),
            },
        ];
        let report = writer.apply(
            &ApplyPlan {
                new: &[],
                updated: &[],
                deleted: &deleted,
                live_paths: &BTreeSet::new(),
            },
            static_site,
        );

        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().all(|f| f.op == WriteOp::Remove));
        assert!(dir.path().join("precious.txt").exists());
    }

    #[test]
    fn test_write_failure_is_recorded_and_rest_continues() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path();
        // A directory where the page should go makes the rename fail.
        fs::create_dir_all(root.join("articles/1.html")).unwrap();

        let writer = OutputWriter::new(root);
        let new = [page(1, "one"), page(2, "two")];
        let live_paths = live(&["articles/1.html", "articles/2.html"]);

        let mut seen_missing = BTreeSet::new();
        let report = writer.apply(
            &ApplyPlan {
                new: &new,
                updated: &[],
                deleted: &[],
                live_paths: &live_paths,
            },
            |missing| {
                seen_missing = missing.clone();
                static_site(missing)
            },
        );

        assert_eq!(report.written, vec![2]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, Some(1));
        assert_eq!(report.failures[0].op, WriteOp::Write);
        assert!(report.failures[0].to_string().starts_with("write articles/1.html (#1)"));

        // The listing is still written, told to leave the missing page out.
        assert!(report.listing_written);
        assert_eq!(seen_missing, BTreeSet::from([1]));
        assert_eq!(report.unlisted, vec![1]);
    }

    #[test]
    fn test_failed_update_with_old_page_stays_listed() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path();
        fs::create_dir_all(root.join("articles")).unwrap();
        fs::write(root.join("articles/1.html"), "old").unwrap();

        // Renaming over a read-only directory fails on unix; the old page stays.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(root.join("articles"), fs::Permissions::from_mode(0o555)).unwrap();
        }

        let writer = OutputWriter::new(root);
        let updated = [page(1, "new")];
        let live_paths = live(&["articles/1.html"]);

        let report = writer.apply(
            &ApplyPlan {
                new: &[],
                updated: &updated,
                deleted: &[],
                live_paths: &live_paths,
            },
            |missing| {
                assert!(missing.is_empty(), "old page is still on disk");
                static_site(missing)
            },
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(root.join("articles"), fs::Permissions::from_mode(0o755)).unwrap();
        }

        assert!(report.unlisted.is_empty());
        assert!(root.join("articles/1.html").is_file());
    }

    #[test]
    fn test_site_files_error_keeps_previous_listing() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path();
        fs::write(root.join("index.html"), "previous").unwrap();

        let writer = OutputWriter::new(root);
        let new = [page(1, "one")];
        let live_paths = live(&["articles/1.html"]);

        let report = writer.apply(
            &ApplyPlan {
                new: &new,
                updated: &[],
                deleted: &[],
                live_paths: &live_paths,
            },
            |_| Err::<SiteFiles, _>("listing data unavailable"),
        );

        assert_eq!(report.written, vec![1]);
        assert!(!report.listing_written);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, "index.html");
        assert_eq!(read(root, "index.html"), "previous");
    }

    #[test]
    fn test_locate() {
        let writer = OutputWriter::new("/site");
        assert_eq!(
            writer.locate("articles/1.html"),
            Some(PathBuf::from("/site/articles/1.html"))
        );
        assert_eq!(writer.locate("../x"), None);
        assert_eq!(writer.locate("/etc/passwd"), None);
        assert_eq!(writer.locate(""), None);
    }
}
