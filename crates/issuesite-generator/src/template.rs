//! HTML template system for page generation.
//!
//! Provides a lightweight template system using string interpolation rather than
//! heavy template engines like Tera or Handlebars.
//!
//! Two templates exist: [`ARTICLE_TEMPLATE`] for a single issue and
//! [`LISTING_TEMPLATE`] for the home page. Either can be replaced by a file
//! named in `[templates]`; overrides are checked against the placeholder set
//! the renderer supplies before anything is fetched.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use issuesite_core::SiteConfig;
use thiserror::Error;
use tracing::{debug, warn};

/// Name of the single-article page template.
pub const ARTICLE_TEMPLATE: &str = "article";

/// Name of the listing page template.
pub const LISTING_TEMPLATE: &str = "listing";

/// Placeholders the renderer fills for article pages.
pub const ARTICLE_PLACEHOLDERS: &[&str] = &[
    "lang",
    "site_title",
    "title",
    "id",
    "body_html",
    "labels",
    "nav",
    "created_at",
    "created_at_iso",
    "theme_mode",
    "primary_color",
    "home_url",
    "search_url",
    "favicon",
    "description",
    "author",
    "vertical_title",
    "summary",
];

/// Placeholders the renderer fills for the listing page.
pub const LISTING_PLACEHOLDERS: &[&str] = &[
    "lang",
    "site_title",
    "site_description",
    "author",
    "avatar",
    "favicon",
    "nav",
    "theme_mode",
    "primary_color",
    "specials_name",
    "specials_html",
    "articles_html",
    "articles_json",
    "specials_json",
    "menu_json",
    "special_labels_json",
    "search_url",
    "article_count",
];

/// Template rendering errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Missing required variable.
    #[error("missing required variable: {0}")]
    MissingVariable(String),

    /// Template not found.
    #[error("template not found: {0}")]
    NotFound(String),

    /// Invalid template syntax.
    #[error("invalid template syntax in {template}: {message}")]
    InvalidSyntax { template: String, message: String },

    /// A required placeholder the renderer never supplies.
    #[error("template {template} requires unknown placeholder {{{{ {name} }}}}")]
    UnknownPlaceholder { template: String, name: String },

    /// Template override cannot be read.
    #[error("cannot read template {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Template context with variables for interpolation.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    variables: HashMap<String, String>,
}

impl TemplateContext {
    /// Create a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a variable into the context.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Create context with initial variables.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Get a variable value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    /// Check if a variable exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.variables.contains_key(key)
    }
}

/// A `{{ name }}` or `{{ name? }}` reference inside a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder<'t> {
    pub name: &'t str,
    pub optional: bool,
}

enum Segment<'t> {
    Text(&'t str),
    Var(Placeholder<'t>),
}

/// A simple template that supports variable interpolation.
///
/// Variables are specified as `{{ variable_name }}` in the template string.
/// A trailing `?` (`{{ variable_name? }}`) makes the variable optional.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    content: String,
}

impl Template {
    /// Create a new template with the given name and content.
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Load a template from a file.
    pub fn from_file(name: impl Into<String>, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(name, content))
    }

    /// Get the template name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw template text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.content
    }

    /// Every placeholder reference, in order of appearance.
    pub fn placeholders(&self) -> Result<Vec<Placeholder<'_>>> {
        Ok(self
            .segments()?
            .into_iter()
            .filter_map(|segment| match segment {
                Segment::Var(p) => Some(p),
                Segment::Text(_) => None,
            })
            .collect())
    }

    /// Render the template with the given context.
    ///
    /// Replaces all `{{ variable }}` placeholders with values from context.
    /// Substituted values are never scanned for placeholders themselves.
    pub fn render(&self, context: &TemplateContext) -> Result<String> {
        let mut result = String::with_capacity(self.content.len() * 2);

        for segment in self.segments()? {
            match segment {
                Segment::Text(text) => result.push_str(text),
                Segment::Var(Placeholder { name, optional }) => match context.get(name) {
                    Some(value) => result.push_str(value),
                    None if optional => {}
                    None => return Err(TemplateError::MissingVariable(name.to_string())),
                },
            }
        }

        Ok(result)
    }

    fn segments(&self) -> Result<Vec<Segment<'_>>> {
        let mut segments = Vec::new();
        let mut rest = self.content.as_str();

        while let Some(start) = rest.find("{{") {
            segments.push(Segment::Text(&rest[..start]));
            let end = rest[start..].find("}}").ok_or_else(|| TemplateError::InvalidSyntax {
                template: self.name.clone(),
                message: "unclosed {{ delimiter".to_string(),
            })?;

            let var_name = rest[start + 2..start + end].trim();

            // Check for optional variable syntax: {{ variable? }}
            let (var_name, optional) = match var_name.strip_suffix('?') {
                Some(stripped) => (stripped.trim_end(), true),
                None => (var_name, false),
            };

            if var_name.is_empty() {
                return Err(TemplateError::InvalidSyntax {
                    template: self.name.clone(),
                    message: "empty placeholder".to_string(),
                });
            }

            segments.push(Segment::Var(Placeholder {
                name: var_name,
                optional,
            }));
            rest = &rest[start + end + 2..];
        }

        segments.push(Segment::Text(rest));
        Ok(segments)
    }

    /// Check every placeholder against the names the renderer supplies.
    ///
    /// An unknown required placeholder can never be satisfied and is an
    /// error. An unknown optional one always renders empty and only warns.
    pub fn check_placeholders(&self, supplied: &[&str]) -> Result<()> {
        for placeholder in self.placeholders()? {
            if supplied.contains(&placeholder.name) {
                continue;
            }
            if placeholder.optional {
                warn!(
                    template = %self.name,
                    placeholder = placeholder.name,
                    "optional placeholder is never supplied and will render empty"
                );
            } else {
                return Err(TemplateError::UnknownPlaceholder {
                    template: self.name.clone(),
                    name: placeholder.name.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Registry of templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Template>,
}

impl TemplateRegistry {
    /// Create a new registry with default templates.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.register_defaults();
        registry
    }

    /// Register default built-in templates.
    fn register_defaults(&mut self) {
        self.register(Template::new(ARTICLE_TEMPLATE, DEFAULT_ARTICLE_TEMPLATE));
        self.register(Template::new(LISTING_TEMPLATE, DEFAULT_LISTING_TEMPLATE));
    }

    /// Built-in templates with any overrides from `[templates]` applied,
    /// validated against the placeholders the renderer supplies.
    pub fn from_config(config: &SiteConfig) -> Result<Self> {
        let mut registry = Self::new();

        let overrides = [
            (ARTICLE_TEMPLATE, config.templates.article.as_deref()),
            (LISTING_TEMPLATE, config.templates.listing.as_deref()),
        ];
        for (name, path) in overrides {
            if let Some(path) = path {
                let path = config.resolve(path);
                debug!(template = name, path = %path.display(), "loading template override");
                registry.register(Template::from_file(name, &path)?);
            }
        }

        registry.validate()?;
        Ok(registry)
    }

    /// Check both page templates against their placeholder sets.
    pub fn validate(&self) -> Result<()> {
        for (name, supplied) in [
            (ARTICLE_TEMPLATE, ARTICLE_PLACEHOLDERS),
            (LISTING_TEMPLATE, LISTING_PLACEHOLDERS),
        ] {
            self.require(name)?.check_placeholders(supplied)?;
        }
        Ok(())
    }

    /// Register a template.
    pub fn register(&mut self, template: Template) {
        self.templates.insert(template.name.clone(), template);
    }

    /// Get a template by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    fn require(&self, name: &str) -> Result<&Template> {
        self.get(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }

    /// Render a named template with the given context.
    pub fn render(&self, name: &str, context: &TemplateContext) -> Result<String> {
        self.require(name)?.render(context)
    }
}

/// Default single-article page.
pub const DEFAULT_ARTICLE_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="{{ lang }}" data-theme="{{ theme_mode }}">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{{ title }} - {{ site_title }}</title>
    <meta name="description" content="{{ summary }}">
    <meta name="author" content="{{ author? }}">
    <meta name="search-index" content="{{ search_url }}">
    <link rel="icon" href="{{ favicon? }}">
    <style>
        :root {
            --color-primary: {{ primary_color }};
            --color-bg: #F8FAFC;
            --color-bg-secondary: #FFFFFF;
            --color-text: #1E293B;
            --color-text-muted: #64748B;
            --color-border: #E2E8F0;
            --color-code-bg: #F1F5F9;
            color-scheme: light;
        }

        [data-theme="dark"] {
            --color-bg: #0F172A;
            --color-bg-secondary: #1E293B;
            --color-text: #F1F5F9;
            --color-text-muted: #94A3B8;
            --color-border: #334155;
            --color-code-bg: #1E293B;
            color-scheme: dark;
        }

        *, *::before, *::after { box-sizing: border-box; }

        body {
            margin: 0;
            font-family: system-ui, -apple-system, sans-serif;
            line-height: 1.7;
            color: var(--color-text);
            background-color: var(--color-bg);
        }

        .container { max-width: 760px; margin: 0 auto; padding: 2rem 1.5rem; }

        a { color: var(--color-primary); text-decoration: none; }
        a:hover { text-decoration: underline; }

        .article-header { display: flex; gap: 1.5rem; margin-bottom: 2rem; }
        .vertical-title {
            writing-mode: vertical-rl;
            font-size: 0.875rem;
            letter-spacing: 0.2em;
            color: var(--color-text-muted);
            border-left: 2px solid var(--color-primary);
            padding-left: 0.5rem;
        }
        .article-header h1 { margin: 0 0 0.5rem; font-size: 2rem; line-height: 1.3; }
        .article-header time { font-size: 0.875rem; color: var(--color-text-muted); }

        .labels { display: flex; flex-wrap: wrap; gap: 0.5rem; margin-top: 0.75rem; padding: 0; list-style: none; }
        .labels li {
            padding: 0.125rem 0.75rem;
            font-size: 0.75rem;
            border-radius: 9999px;
            background-color: var(--color-code-bg);
            color: var(--color-primary);
        }

        code {
            font-family: ui-monospace, 'Cascadia Code', Menlo, Consolas, monospace;
            font-size: 0.875em;
            background-color: var(--color-code-bg);
            padding: 0.125rem 0.375rem;
            border-radius: 0.25rem;
        }
        pre {
            padding: 1rem;
            overflow-x: auto;
            border-radius: 0.5rem;
            border: 1px solid var(--color-border);
            background-color: var(--color-code-bg);
        }
        pre code { background: none; padding: 0; }
        pre.unrendered { white-space: pre-wrap; border-style: dashed; }

        blockquote {
            margin: 1.5rem 0;
            padding-left: 1rem;
            border-left: 3px solid var(--color-primary);
            color: var(--color-text-muted);
        }

        img { max-width: 100%; height: auto; border-radius: 0.5rem; }

        .table-wrapper { overflow-x: auto; margin: 1.5rem 0; }
        table { width: 100%; border-collapse: collapse; font-size: 0.875rem; }
        th, td { padding: 0.5rem 0.75rem; border-bottom: 1px solid var(--color-border); }

        .site-footer { margin-top: 3rem; font-size: 0.875rem; color: var(--color-text-muted); }

        .menu {
            position: fixed;
            right: 1.5rem;
            bottom: 1.5rem;
            display: flex;
            flex-direction: column;
            gap: 0.5rem;
        }
        .menu a, .menu button {
            display: block;
            padding: 0.5rem 0.875rem;
            font-size: 0.875rem;
            border-radius: 9999px;
            border: 1px solid var(--color-border);
            background-color: var(--color-bg-secondary);
            color: var(--color-text);
            cursor: pointer;
        }

        @media (max-width: 640px) {
            .container { padding: 1.5rem 1rem; }
            .article-header h1 { font-size: 1.5rem; }
            .vertical-title { display: none; }
        }
    </style>
</head>
<body>
    <main class="container">
        <article class="issue" data-id="{{ id }}">
            <header class="article-header">
                <div class="vertical-title">{{ vertical_title }}</div>
                <div>
                    <h1>{{ title }}</h1>
                    <time datetime="{{ created_at_iso }}">{{ created_at }}</time>
                    {{ labels }}
                </div>
            </header>
            <div class="content">
                {{ body_html }}
            </div>
        </article>
        <footer class="site-footer">
            <p>{{ description? }}</p>
        </footer>
    </main>
    <nav class="menu">
        <a href="{{ home_url }}">{{ site_title }}</a>
        {{ nav }}
        <button class="theme-toggle" type="button" aria-label="Toggle theme">&#9681;</button>
    </nav>
    <script>
        (function () {
            var html = document.documentElement;
            var saved = localStorage.getItem('theme');
            if (saved) html.setAttribute('data-theme', saved);
            document.querySelector('.theme-toggle').addEventListener('click', function () {
                var next = html.getAttribute('data-theme') === 'dark' ? 'light' : 'dark';
                html.setAttribute('data-theme', next);
                localStorage.setItem('theme', next);
            });
        })();
    </script>
</body>
</html>
"##;

/// Default listing (home) page.
pub const DEFAULT_LISTING_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="{{ lang }}" data-theme="{{ theme_mode }}">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{{ site_title }}</title>
    <meta name="description" content="{{ site_description? }}">
    <meta name="author" content="{{ author? }}">
    <link rel="icon" href="{{ favicon? }}">
    <style>
        :root {
            --color-primary: {{ primary_color }};
            --color-bg: #F8FAFC;
            --color-bg-secondary: #FFFFFF;
            --color-text: #1E293B;
            --color-text-muted: #64748B;
            --color-border: #E2E8F0;
            color-scheme: light;
        }

        [data-theme="dark"] {
            --color-bg: #0F172A;
            --color-bg-secondary: #1E293B;
            --color-text: #F1F5F9;
            --color-text-muted: #94A3B8;
            --color-border: #334155;
            color-scheme: dark;
        }

        *, *::before, *::after { box-sizing: border-box; }

        body {
            margin: 0;
            font-family: system-ui, -apple-system, sans-serif;
            line-height: 1.6;
            color: var(--color-text);
            background-color: var(--color-bg);
        }

        .container { max-width: 960px; margin: 0 auto; padding: 2rem 1.5rem; }

        a { color: inherit; text-decoration: none; }

        .site-header { display: flex; align-items: center; gap: 1rem; margin-bottom: 2rem; }
        .site-header img { width: 64px; height: 64px; border-radius: 50%; }
        .site-header h1 { margin: 0; font-size: 1.75rem; }
        .site-header p { margin: 0; color: var(--color-text-muted); }

        .search input {
            width: 100%;
            padding: 0.625rem 1rem;
            font-size: 1rem;
            border-radius: 0.5rem;
            border: 1px solid var(--color-border);
            background-color: var(--color-bg-secondary);
            color: var(--color-text);
        }
        .search-results { list-style: none; padding: 0; }
        .search-results li { padding: 0.5rem 0; border-bottom: 1px solid var(--color-border); }
        .search-results .excerpt { display: block; font-size: 0.875rem; color: var(--color-text-muted); }

        h2 { font-size: 1.125rem; margin: 2rem 0 1rem; color: var(--color-text-muted); }

        .cards { display: grid; grid-template-columns: repeat(auto-fill, minmax(260px, 1fr)); gap: 1rem; }
        .card {
            display: flex;
            gap: 0.75rem;
            padding: 1rem;
            border-radius: 0.75rem;
            border: 1px solid var(--color-border);
            background-color: var(--color-bg-secondary);
        }
        .card:hover { border-color: var(--color-primary); }
        .card .vertical-title {
            writing-mode: vertical-rl;
            font-size: 0.75rem;
            letter-spacing: 0.2em;
            color: var(--color-primary);
        }
        .card h3 { margin: 0 0 0.25rem; font-size: 1rem; }
        .card p { margin: 0; font-size: 0.875rem; color: var(--color-text-muted); }
        .card time { font-size: 0.75rem; color: var(--color-text-muted); }
        .card.archived { opacity: 0.6; }
        .card.special { border-color: var(--color-primary); }

        .labels { display: flex; flex-wrap: wrap; gap: 0.25rem; margin: 0.5rem 0 0; padding: 0; list-style: none; }
        .labels li { font-size: 0.6875rem; color: var(--color-primary); }

        .menu {
            position: fixed;
            right: 1.5rem;
            bottom: 1.5rem;
            display: flex;
            flex-direction: column;
            gap: 0.5rem;
        }
        .menu a, .menu button {
            display: block;
            padding: 0.5rem 0.875rem;
            font-size: 0.875rem;
            border-radius: 9999px;
            border: 1px solid var(--color-border);
            background-color: var(--color-bg-secondary);
            color: var(--color-text);
            cursor: pointer;
        }
    </style>
</head>
<body>
    <main class="container">
        <header class="site-header">
            <img src="{{ avatar? }}" alt="" onerror="this.remove()">
            <div>
                <h1>{{ site_title }}</h1>
                <p>{{ site_description? }}</p>
            </div>
        </header>

        <section class="search">
            <input type="search" id="search-input" placeholder="Search" autocomplete="off" data-index="{{ search_url }}">
            <ul class="search-results" id="search-results"></ul>
        </section>

        <section class="specials">
            <h2>{{ specials_name }}</h2>
            <div class="cards">
                {{ specials_html }}
            </div>
        </section>

        <section class="articles">
            <h2>Articles ({{ article_count }})</h2>
            <div class="cards">
                {{ articles_html }}
            </div>
        </section>
    </main>

    <nav class="menu">
        {{ nav }}
        <button class="theme-toggle" type="button" aria-label="Toggle theme">&#9681;</button>
    </nav>

    <script type="application/json" id="articles-data">{{ articles_json }}</script>
    <script type="application/json" id="specials-data">{{ specials_json }}</script>
    <script type="application/json" id="menu-data">{{ menu_json }}</script>
    <script type="application/json" id="special-labels-data">{{ special_labels_json }}</script>

    <script>
        (function () {
            var html = document.documentElement;
            var saved = localStorage.getItem('theme');
            if (saved) html.setAttribute('data-theme', saved);
            document.querySelector('.theme-toggle').addEventListener('click', function () {
                var next = html.getAttribute('data-theme') === 'dark' ? 'light' : 'dark';
                html.setAttribute('data-theme', next);
                localStorage.setItem('theme', next);
            });

            // Days-running counter on the fallback card.
            document.querySelectorAll('[data-since]').forEach(function (el) {
                var parts = el.getAttribute('data-since').split('.');
                var since = new Date(+parts[0], +parts[1] - 1, +parts[2]);
                var days = Math.floor((Date.now() - since.getTime()) / 86400000);
                if (!isNaN(days)) el.textContent = days + ' days';
            });

            var input = document.getElementById('search-input');
            var results = document.getElementById('search-results');
            var index = null;

            function terms(text) {
                return text.toLowerCase().split(/\s+/).filter(function (t) { return t.length > 0; });
            }

            function render(query) {
                results.innerHTML = '';
                var wanted = terms(query);
                if (!index || wanted.length === 0) return;
                index.filter(function (entry) {
                    var hay = (entry.title + ' ' + entry.excerpt + ' ' + entry.labels.join(' ')).toLowerCase();
                    return wanted.every(function (t) { return hay.indexOf(t) !== -1; });
                }).slice(0, 20).forEach(function (entry) {
                    var li = document.createElement('li');
                    var a = document.createElement('a');
                    a.href = entry.url;
                    a.textContent = entry.title;
                    var span = document.createElement('span');
                    span.className = 'excerpt';
                    span.textContent = entry.excerpt;
                    li.appendChild(a);
                    li.appendChild(span);
                    results.appendChild(li);
                });
            }

            input.addEventListener('input', function () {
                if (index) return render(input.value);
                fetch(input.getAttribute('data-index'))
                    .then(function (r) { return r.json(); })
                    .then(function (data) { index = data; render(input.value); })
                    .catch(function () { index = []; });
            });
        })();
    </script>
</body>
</html>
"##;
