//! Run orchestration.
//!
//! One run: load templates, fetch, reconcile against the cache, render the
//! changed articles plus the listing and index, apply to the output tree,
//! and record what was written. Every fatal error happens before the output
//! tree is touched; after that, problems are collected into the report.
//!
//! The cache only ever records what is on disk. An article counts as written
//! once its page and, when an archive directory is configured, its raw
//! markdown are both in place.

use std::{
    collections::BTreeSet,
    fmt,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use chrono::Utc;
use issuesite_core::{Article, CacheEntry, SiteConfig};
use issuesite_parser::RenderWarning;
use issuesite_search::SearchIndex;
use issuesite_source::{Fetcher, IssueSource};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::{
    archive::MarkdownArchive,
    cache::CacheStore,
    error::{ConfigError, PipelineError, Result},
    reconcile::reconcile,
    render::{Renderer, check_slug_collisions},
    template::TemplateRegistry,
    writer::{ApplyPlan, DeletedPage, IndexFile, OutputWriter, SiteFiles, WriteFailure, WriteOp},
};

#[derive(Debug, Default)]
struct AbortState {
    aborted: AtomicBool,
    notify: Notify,
}

/// Shared cancellation signal.
///
/// Honoured up to the start of the apply phase, including while the fetch
/// is in flight. Once files are being written the run finishes.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AbortState>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn abort(&self) {
        self.0.aborted.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.0.aborted.load(Ordering::SeqCst)
    }

    /// Resolves once [`abort`](Self::abort) has been called.
    pub async fn aborted(&self) {
        loop {
            let notified = self.0.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

/// A render warning attributed to its article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleWarning {
    pub id: u64,
    pub warning: RenderWarning,
}

impl fmt::Display for ArticleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}: {}", self.id, self.warning)
    }
}

/// Everything a completed run did.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Articles in the fetch.
    pub fetched: usize,
    pub new: Vec<u64>,
    pub updated: Vec<u64>,
    pub deleted: Vec<u64>,
    pub unchanged: Vec<u64>,
    /// Unchanged articles rewritten because their page was missing.
    pub repaired: Vec<u64>,
    /// Unchanged articles rewritten because the render setup changed or
    /// a rebuild was forced.
    pub rebuilt: usize,
    /// Article pages written.
    pub written: usize,
    pub orphans_removed: Vec<String>,
    /// Articles left off the listing and index because their page could not
    /// be written.
    pub unlisted: Vec<u64>,
    /// Markdown files written to the archive directory.
    pub archived: usize,
    pub listing_written: bool,
    pub index_written: bool,
    pub warnings: Vec<ArticleWarning>,
    pub failures: Vec<WriteFailure>,
    pub duration_ms: u64,
}

impl RunReport {
    /// No write failures.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Nothing was new, updated, or deleted.
    pub fn is_noop(&self) -> bool {
        self.new.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} articles: {} new, {} updated, {} deleted, {} unchanged, {} failed ({} ms)",
            self.fetched,
            self.new.len(),
            self.updated.len(),
            self.deleted.len(),
            self.unchanged.len(),
            self.failures.len(),
            self.duration_ms
        )
    }
}

/// A configured run over one source.
#[derive(Debug)]
pub struct Pipeline<'a, S> {
    config: &'a SiteConfig,
    fetcher: Fetcher<S>,
    output_dir: PathBuf,
    cache_path: PathBuf,
    archive_dir: Option<PathBuf>,
    force: bool,
    abort: AbortFlag,
}

impl<'a, S: IssueSource> Pipeline<'a, S> {
    /// Create a pipeline writing where the configuration says.
    pub fn new(config: &'a SiteConfig, fetcher: Fetcher<S>) -> Self {
        Self {
            config,
            fetcher,
            output_dir: config.resolve(&config.build.output_dir),
            cache_path: config.resolve(&config.build.cache_path),
            archive_dir: config.build.archive_dir.as_ref().map(|dir| config.resolve(dir)),
            force: false,
            abort: AbortFlag::new(),
        }
    }

    /// Override the output directory.
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Override the cache location.
    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = path.into();
        self
    }

    /// Keep each article's raw markdown in `dir`.
    pub fn archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = Some(dir.into());
        self
    }

    /// Rewrite every page even if nothing changed.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn abort_flag(mut self, abort: AbortFlag) -> Self {
        self.abort = abort;
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output_dir
    }

    fn check_abort(&self, stage: &'static str) -> Result<()> {
        if self.abort.is_aborted() {
            return Err(self.aborted_at(stage));
        }
        Ok(())
    }

    fn aborted_at(&self, stage: &'static str) -> PipelineError {
        warn!(stage, "run aborted");
        PipelineError::Aborted { stage }
    }

    /// Listing plus, when search is enabled, the index over `articles`.
    fn site_files(&self, renderer: &Renderer<'_>, articles: &[Article]) -> Result<SiteFiles> {
        let listing = renderer.render_listing(articles)?;
        let index = if self.config.search.enabled {
            Some(IndexFile {
                path: self.config.search.file_name.clone(),
                json: SearchIndex::build(articles, self.config, renderer.markdown()).to_json()?,
            })
        } else {
            None
        };
        Ok(SiteFiles { listing, index })
    }

    /// Execute one run.
    pub async fn run(&self) -> Result<RunReport> {
        let started = Instant::now();
        let config = self.config;
        let slug = config.build.slug;

        let templates = TemplateRegistry::from_config(config).map_err(ConfigError::from)?;
        let renderer = Renderer::new(config, &templates)?;
        let fingerprint = renderer.fingerprint()?;

        self.check_abort("fetch")?;
        info!("fetching articles");
        let articles = tokio::select! {
            fetched = self.fetcher.fetch_all(None) => fetched?,
            () = self.abort.aborted() => return Err(self.aborted_at("fetch")),
        };
        check_slug_collisions(&articles, slug)?;

        let mut cache = CacheStore::open(&self.cache_path)?;
        let writer = OutputWriter::new(&self.output_dir);
        let archive = self.archive_dir.as_ref().map(MarkdownArchive::new);

        let mut plan = reconcile(&articles, cache.entries());

        let mut rebuilt = 0;
        if self.force || cache.fingerprint() != Some(fingerprint.as_str()) {
            rebuilt = plan.promote_unchanged(&articles, |_| true);
            if rebuilt > 0 {
                info!(count = rebuilt, force = self.force, "render setup changed, rebuilding pages");
            }
        }

        let mut repaired = Vec::new();
        plan.promote_unchanged(&articles, |article| {
            let missing = !writer.exists(&article.output_path(slug))
                || archive.as_ref().is_some_and(|archive| !archive.exists(article.id));
            if missing {
                repaired.push(article.id);
            }
            missing
        });
        if !repaired.is_empty() {
            warn!(ids = ?repaired, "cached files missing, rewriting");
        }

        let deleted: Vec<DeletedPage> = plan
            .deleted
            .iter()
            .filter_map(|&id| cache.get(id))
            .map(|entry| DeletedPage {
                id: entry.id,
                output_path: entry.output_path.clone(),
            })
            .collect();

        info!(
            new = plan.new.len(),
            updated = plan.updated.len(),
            deleted = plan.deleted.len(),
            unchanged = plan.unchanged.len(),
            "reconciled with cache"
        );

        let changed: Vec<&Article> = plan.changed().collect();
        let rendered = renderer.render_all(&changed)?;
        let (new_pages, updated_pages) = rendered.split_at(plan.new.len());
        let full_site = self.site_files(&renderer, &articles)?;
        let live_paths: BTreeSet<String> = articles.iter().map(|a| a.output_path(slug)).collect();

        self.check_abort("apply")?;
        info!(pages = rendered.len(), output = %self.output_dir.display(), "applying output");
        let mut applied = writer.apply(
            &ApplyPlan {
                new: new_pages,
                updated: updated_pages,
                deleted: &deleted,
                live_paths: &live_paths,
            },
            |missing| {
                if missing.is_empty() {
                    return Ok(full_site);
                }
                warn!(ids = ?missing, "leaving unwritten pages off the listing");
                let listed: Vec<Article> = articles
                    .iter()
                    .filter(|article| !missing.contains(&article.id))
                    .cloned()
                    .collect();
                self.site_files(&renderer, &listed)
            },
        );

        let mut written_ids: BTreeSet<u64> = applied.written.iter().copied().collect();
        let mut removed_ids: BTreeSet<u64> = applied.removed.iter().copied().collect();
        let mut archived = 0;
        if let Some(archive) = &archive {
            for article in &changed {
                if !written_ids.contains(&article.id) {
                    continue;
                }
                match archive.store(article.id, &article.body) {
                    Ok(()) => archived += 1,
                    Err(error) => {
                        warn!(id = article.id, %error, "failed to archive markdown");
                        written_ids.remove(&article.id);
                        applied.failures.push(WriteFailure {
                            path: archive.path_for(article.id).display().to_string(),
                            id: Some(article.id),
                            op: WriteOp::Write,
                            error,
                        });
                    }
                }
            }

            for &id in &applied.removed {
                if let Err(error) = archive.remove(id) {
                    warn!(id, %error, "failed to remove archived markdown");
                    removed_ids.remove(&id);
                    applied.failures.push(WriteFailure {
                        path: archive.path_for(id).display().to_string(),
                        id: Some(id),
                        op: WriteOp::Remove,
                        error,
                    });
                }
            }

            // Deleted articles whose page is still on disk keep their markdown.
            let live_ids: BTreeSet<u64> = articles
                .iter()
                .map(|a| a.id)
                .chain(plan.deleted.iter().copied().filter(|id| !removed_ids.contains(id)))
                .collect();
            if let Err(error) = archive.sweep(&live_ids) {
                warn!(dir = %archive.dir().display(), %error, "failed to sweep archive");
                applied.failures.push(WriteFailure {
                    path: archive.dir().display().to_string(),
                    id: None,
                    op: WriteOp::Sweep,
                    error,
                });
            }
        }

        let now = Utc::now();
        for page in rendered.iter().filter(|page| written_ids.contains(&page.id)) {
            cache.record(CacheEntry::new(
                page.id,
                page.content_hash.clone(),
                now,
                page.document.path.clone(),
            ));
        }
        for &id in &removed_ids {
            cache.remove(id);
        }
        if applied.is_clean() {
            cache.set_fingerprint(fingerprint);
        }
        cache.commit()?;
        debug!(entries = cache.len(), path = %cache.path().display(), "cache updated");

        let warnings = rendered
            .iter()
            .flat_map(|page| {
                page.warnings.iter().map(|warning| ArticleWarning {
                    id: page.id,
                    warning: warning.clone(),
                })
            })
            .collect();

        let report = RunReport {
            fetched: articles.len(),
            new: plan.new.iter().map(|a| a.id).collect(),
            updated: plan.updated.iter().map(|a| a.id).collect(),
            deleted: plan.deleted.clone(),
            unchanged: plan.unchanged.clone(),
            repaired,
            rebuilt,
            written: applied.written.len(),
            orphans_removed: applied.orphans_removed,
            unlisted: applied.unlisted,
            archived,
            listing_written: applied.listing_written,
            index_written: applied.index_written,
            warnings,
            failures: applied.failures,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(%report, "run complete");
        Ok(report)
    }
}

