//! Pipeline error taxonomy.
//!
//! Every variant here is fatal and names the stage that failed. Recoverable
//! problems (render warnings, single-file write failures) never become
//! errors; they are collected into the run report instead.

use issuesite_core::CoreError;
use issuesite_parser::ParserError;
use issuesite_search::SearchError;
use issuesite_source::SourceError;
use thiserror::Error;

use crate::{cache::CacheError, render::RenderError, template::TemplateError};

/// Configuration problems found before anything is mutated.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Site configuration could not be loaded or is invalid.
    #[error(transparent)]
    Site(#[from] CoreError),

    /// A template is unreadable or asks for a placeholder that cannot be supplied.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Syntax highlighting theme does not exist.
    #[error(transparent)]
    Theme(#[from] ParserError),

    /// Several articles map to the same output file.
    #[error("slug collision: {}", format_collisions(.0))]
    SlugCollision(Vec<(String, Vec<u64>)>),
}

fn format_collisions(collisions: &[(String, Vec<u64>)]) -> String {
    collisions
        .iter()
        .map(|(path, ids)| {
            let ids: Vec<String> = ids.iter().map(|id| format!("#{id}")).collect();
            format!("{path} <- {}", ids.join(", "))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fatal pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config stage failed: {0}")]
    Config(#[from] ConfigError),

    #[error("fetch stage failed: {0}")]
    Fetch(#[from] SourceError),

    #[error("cache stage failed: {0}")]
    Cache(#[from] CacheError),

    #[error("render stage failed: {0}")]
    Render(#[from] RenderError),

    #[error("index stage failed: {0}")]
    Index(#[from] SearchError),

    /// Cancelled before the output tree was touched.
    #[error("run aborted before {stage} stage; nothing was written")]
    Aborted { stage: &'static str },
}

impl PipelineError {
    /// Name of the failing stage.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Fetch(_) => "fetch",
            Self::Cache(_) => "cache",
            Self::Render(_) => "render",
            Self::Index(_) => "index",
            Self::Aborted { stage } => stage,
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
