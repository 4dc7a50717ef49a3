//! Build command - syncs issues and regenerates the site

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Result, WrapErr};
use issuesite_core::SiteConfig;
use issuesite_generator::{AbortFlag, Pipeline, RunReport};
use issuesite_source::{DumpSource, Fetcher, GitHubSource, IssueSource};

use super::check::quick_validate;

/// Flags of the build command.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub output: Option<PathBuf>,
    pub cache: Option<PathBuf>,
    pub force: bool,
    pub from_file: Option<PathBuf>,
    pub repo: Option<String>,
}

/// Run the build command.
///
/// Fetches every issue, rewrites the pages that changed, and prints the run
/// report. Ctrl-C before files are written stops the run cleanly.
pub async fn run(config_path: &Path, options: BuildOptions) -> Result<RunReport> {
    tracing::info!(?config_path, ?options, "Starting build");

    let mut config =
        SiteConfig::load_with_env(config_path).wrap_err("Failed to load configuration")?;

    if let Some(repo) = &options.repo {
        tracing::info!(repo = %repo, "Overriding source repository from CLI");
        config.source.repo = repo.clone();
        config.validate().wrap_err("Invalid repository override")?;
    }

    let warnings = quick_validate(&config, options.from_file.is_some());
    if !warnings.is_empty() {
        eprintln!();
        eprintln!("  Warnings:");
        for warn in &warnings {
            eprintln!("  ⚠ {warn}");
        }
        eprintln!();
    }

    tracing::debug!(?config, "Loaded configuration");

    let abort = AbortFlag::new();
    let flag = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupt received, stopping before any output is written");
        flag.abort();

        // Past the apply point the run finishes; a second interrupt exits anyway.
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Second interrupt, exiting");
            std::process::exit(130);
        }
    });

    let report = match &options.from_file {
        Some(path) => {
            let source = DumpSource::from_path(path).wrap_err("Failed to read issue dump")?;
            tracing::info!(issues = source.len(), path = %path.display(), "Using offline issue dump");
            execute(&config, source, &options, abort).await?
        }
        None => {
            let source = GitHubSource::from_config(&config.source)
                .wrap_err("Cannot reach the issue tracker; set source.repo or use --from-file")?;
            execute(&config, source, &options, abort).await?
        }
    };

    print_report(&report);
    Ok(report)
}

async fn execute<S: IssueSource>(
    config: &SiteConfig,
    source: S,
    options: &BuildOptions,
    abort: AbortFlag,
) -> Result<RunReport> {
    let mut pipeline = Pipeline::new(config, Fetcher::from_config(source, &config.source))
        .force(options.force)
        .abort_flag(abort);

    if let Some(output) = &options.output {
        pipeline = pipeline.output_dir(output);
    }
    if let Some(cache) = &options.cache {
        pipeline = pipeline.cache_path(cache);
    }

    pipeline.run().await.wrap_err("Build failed")
}

fn print_report(report: &RunReport) {
    println!();
    if report.is_clean() {
        println!("  Build completed successfully!");
    } else {
        println!("  Build completed with errors");
    }
    println!();
    println!("  Articles:   {}", report.fetched);
    println!("  New:        {}", report.new.len());
    println!("  Updated:    {}", report.updated.len());
    println!("  Deleted:    {}", report.deleted.len());
    println!("  Unchanged:  {}", report.unchanged.len());
    if !report.repaired.is_empty() {
        println!("  Repaired:   {}", report.repaired.len());
    }
    if !report.unlisted.is_empty() {
        println!("  Unlisted:   {}", report.unlisted.len());
    }
    if report.archived > 0 {
        println!("  Archived:   {}", report.archived);
    }
    if !report.orphans_removed.is_empty() {
        println!("  Orphans:    {}", report.orphans_removed.len());
    }
    println!("  Failed:     {}", report.failures.len());
    println!();
    println!("  Duration:   {:.2}s", report.duration_ms as f64 / 1000.0);
    println!();

    if !report.warnings.is_empty() {
        println!("  Render warnings:");
        for warning in &report.warnings {
            println!("  ⚠ {warning}");
        }
        println!();
    }

    if !report.failures.is_empty() {
        println!("  Write failures (retried on the next run):");
        for failure in &report.failures {
            println!("  ✗ {failure}");
        }
        println!();
    }

    tracing::info!(%report, "Build finished");
}
