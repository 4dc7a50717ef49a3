//! issuesite CLI
//!
//! Turns an issue tracker into a static site with client-side search.
//!
//! This is the binary entry point. The library functionality is in `lib.rs`.

use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;
use issuesite::cmd::build::BuildOptions;

/// Command-line interface for issuesite.
#[derive(Parser)]
#[command(
    name = "issuesite",
    version,
    about = "Turn an issue tracker into a static site"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "issuesite.toml")]
    config: std::path::PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(clap::Subcommand)]
enum Commands {
    /// Sync issues and regenerate changed pages
    Build {
        /// Output directory (overrides build.output_dir)
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
        /// Cache file (overrides build.cache_path)
        #[arg(long)]
        cache: Option<std::path::PathBuf>,
        /// Rewrite every page even if nothing changed
        #[arg(long)]
        force: bool,
        /// Read issues from a JSON dump instead of the API
        #[arg(long, value_name = "FILE")]
        from_file: Option<std::path::PathBuf>,
        /// Override source repository (owner/name)
        #[arg(long)]
        repo: Option<String>,
    },
    /// Validate configuration and templates without fetching
    Check {
        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },
    /// Query a built search index
    Search {
        /// Search terms
        query: String,
        /// Output directory holding the index (overrides build.output_dir)
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
        /// Maximum number of results
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    issuesite::init_tracing(cli.verbose);

    match cli.command {
        Commands::Build {
            output,
            cache,
            force,
            from_file,
            repo,
        } => {
            let report = issuesite::cmd::build::run(
                &cli.config,
                BuildOptions {
                    output,
                    cache,
                    force,
                    from_file,
                    repo,
                },
            )
            .await?;
            if !report.is_clean() {
                return Ok(ExitCode::from(2));
            }
        }
        Commands::Check { strict } => {
            issuesite::cmd::check::run(&cli.config, strict)?;
        }
        Commands::Search {
            query,
            output,
            limit,
        } => {
            issuesite::cmd::search::run(&cli.config, output.as_deref(), &query, limit)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
