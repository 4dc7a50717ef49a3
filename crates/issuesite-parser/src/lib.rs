//! issuesite Parser Library
//!
//! Renders issue bodies (GitHub-flavoured Markdown) to HTML and plain text.
//! Rendering never fails: malformed constructs stop the render at the fault
//! and are reported as [`RenderWarning`]s.

pub mod markdown;
pub mod syntax;

pub use markdown::{MarkdownRenderer, RenderFault, RenderWarning, Rendered, html_escape};
pub use syntax::SyntaxHighlighter;
use thiserror::Error;

/// Parser errors.
#[derive(Debug, Error)]
pub enum ParserError {
    /// The configured highlighting theme does not exist.
    #[error("unknown syntax theme {name:?} (available: {available})")]
    UnknownTheme { name: String, available: String },
}

/// Result type for parser operations.
pub type Result<T> = std::result::Result<T, ParserError>;
