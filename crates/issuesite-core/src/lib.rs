//! issuesite Core Library
//!
//! Core types, configuration, and error handling for the issuesite generator.

pub mod article;
pub mod cache;
pub mod config;
pub mod error;
pub mod meta;

pub use article::{Article, ArticleState, ContentHash};
pub use cache::CacheEntry;
pub use config::{ClosedPolicy, SiteConfig, SlugStyle};
pub use error::{CoreError, Result};
pub use meta::IssueMeta;
