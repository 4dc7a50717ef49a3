//! Syntax highlighting for code blocks.

use syntect::{highlighting::ThemeSet, html::highlighted_html_for_string, parsing::SyntaxSet};

use crate::{ParserError, Result, markdown::html_escape};

/// Class used for code blocks without a recognised language.
const PLAINTEXT_CLASS: &str = "language-plaintext";

/// Syntax highlighter using syntect.
#[derive(Debug)]
pub struct SyntaxHighlighter {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
    theme: String,
}

impl Default for SyntaxHighlighter {
    fn default() -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: ThemeSet::load_defaults(),
            theme: "base16-ocean.dark".to_string(),
        }
    }
}

impl SyntaxHighlighter {
    /// Create a highlighter using the named theme.
    pub fn with_theme(theme: &str) -> Result<Self> {
        let mut highlighter = Self::default();
        if !highlighter.theme_set.themes.contains_key(theme) {
            return Err(ParserError::UnknownTheme {
                name: theme.to_string(),
                available: highlighter.available_themes().join(", "),
            });
        }
        highlighter.theme = theme.to_string();
        Ok(highlighter)
    }

    /// Get available theme names.
    pub fn available_themes(&self) -> Vec<&str> {
        // BTreeMap keys, so the list is sorted.
        self.theme_set.themes.keys().map(|s| s.as_str()).collect()
    }

    /// Name of the active theme.
    pub fn theme(&self) -> &str {
        &self.theme
    }

    /// Highlight code with the given language.
    ///
    /// Code without a language, or with one syntect does not know, is emitted
    /// escaped inside `<pre><code class="language-...">`.
    pub fn highlight(&self, code: &str, lang: Option<&str>) -> String {
        let Some(lang) = lang.map(str::trim).filter(|l| !l.is_empty()) else {
            return plain_block(code, PLAINTEXT_CLASS);
        };

        let syntax = self.syntax_set.find_syntax_by_token(lang);
        let theme = self.theme_set.themes.get(&self.theme);

        match (syntax, theme) {
            (Some(syntax), Some(theme)) => {
                highlighted_html_for_string(code, &self.syntax_set, syntax, theme)
                    .unwrap_or_else(|e| {
                        tracing::debug!(lang, error = %e, "highlighting failed, emitting plain block");
                        plain_block(code, &language_class(lang))
                    })
            }
            _ => plain_block(code, &language_class(lang)),
        }
    }
}

fn language_class(lang: &str) -> String {
    let safe: String = lang
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '#'))
        .collect();
    if safe.is_empty() {
        PLAINTEXT_CLASS.to_string()
    } else {
        format!("language-{safe}")
    }
}

fn plain_block(code: &str, class: &str) -> String {
    format!("<pre><code class=\"{class}\">{}</code></pre>\n", html_escape(code))
}
