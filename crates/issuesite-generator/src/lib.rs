//! issuesite Generator Library
//!
//! Incremental site generation engine for issuesite.
//!
//! # Modules
//!
//! - [`cache`] - Durable record of rendered pages
//! - [`reconcile`] - Change detection against the cache
//! - [`template`] - HTML template system with variable interpolation
//! - [`render`] - Article and listing page rendering
//! - [`writer`] - Output tree mutation
//! - [`archive`] - Raw markdown kept beside the cache
//! - [`pipeline`] - Run orchestration

pub mod archive;
pub mod cache;
pub mod error;
pub mod pipeline;
pub mod reconcile;
pub mod render;
pub mod template;
pub mod writer;

pub use archive::MarkdownArchive;
pub use cache::{CacheError, CacheStore};
pub use error::{ConfigError, PipelineError, Result};
pub use pipeline::{AbortFlag, ArticleWarning, Pipeline, RunReport};
pub use reconcile::{Reconciliation, reconcile};
pub use render::{HtmlDocument, RenderError, RenderedArticle, Renderer, check_slug_collisions};
pub use template::{Template, TemplateContext, TemplateError, TemplateRegistry};
pub use writer::{IndexFile, OutputWriter, SiteFiles, WriteFailure, WriteOp, WriteReport};
