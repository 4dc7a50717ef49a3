//! issuesite CLI Library
//!
//! This library provides the core functionality for the issuesite CLI.
//! It is designed to be used by the binary entry point while also exposing
//! public APIs for documentation and integration purposes.
//!
//! # Modules
//!
//! - [`cmd`] - Command implementations (build, check, search)
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use issuesite::cmd;
//!
//! // Validate configuration and templates
//! cmd::check::run(Path::new("issuesite.toml"), false).unwrap();
//! ```

pub mod cmd;

// Re-export core types for convenience
pub use issuesite_core::{Article, SiteConfig};
pub use issuesite_generator::{Pipeline, RunReport};

/// Initialize tracing with the specified verbosity level.
///
/// # Arguments
///
/// * `verbose` - Verbosity level (0 = WARN, 1 = INFO, 2 = DEBUG, 3+ = TRACE)
///
/// # Example
///
/// ```no_run
/// issuesite::init_tracing(2); // Enable DEBUG level logging
/// ```
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}
