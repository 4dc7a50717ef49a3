//! Site configuration management.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Labels that always mark an article as a special card.
pub const BUILTIN_SPECIAL_LABELS: [&str; 2] = ["special", "top"];

/// Immutable per-run configuration.
///
/// Loaded once at the start of a run and passed by reference to every stage
/// that needs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site-wide presentation settings.
    pub site: SiteInfo,

    /// Issue tracker settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Build settings.
    #[serde(default)]
    pub build: BuildConfig,

    /// Theme settings.
    #[serde(default)]
    pub theme: ThemeConfig,

    /// Floating menu entries.
    #[serde(default)]
    pub menu: Vec<MenuEntry>,

    /// Special-card rules.
    #[serde(default)]
    pub special: SpecialConfig,

    /// Search settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Template overrides.
    #[serde(default)]
    pub templates: TemplateConfig,

    /// Directory the configuration was loaded from; relative paths resolve against it.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Site presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteInfo {
    /// Site title.
    pub title: String,

    /// Site description for meta tags and the listing header.
    #[serde(default)]
    pub description: Option<String>,

    /// Site author name.
    #[serde(default)]
    pub author: Option<String>,

    /// Avatar image URL shown on the listing.
    #[serde(default)]
    pub avatar: Option<String>,

    /// Favicon URL.
    #[serde(default)]
    pub favicon: Option<String>,

    /// Public base URL (e.g., "https://example.com/blog"). Empty means relative links.
    #[serde(default)]
    pub base_url: String,

    /// Document language code.
    #[serde(default = "default_lang")]
    pub lang: String,
}

/// What happens to issues closed upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClosedPolicy {
    /// Closed issues are dropped from the site.
    #[default]
    Delete,
    /// Closed issues stay published and are marked archived.
    Archive,
}

/// Issue tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Repository in `owner/name` form.
    #[serde(default)]
    pub repo: String,

    /// REST API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Items requested per page (1..=100).
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Retries per page request before the fetch fails.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial retry backoff in milliseconds, doubled on each attempt.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Treatment of closed issues.
    #[serde(default)]
    pub closed: ClosedPolicy,
}

/// How article output paths are derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlugStyle {
    /// `articles/<id>.html`
    #[default]
    Id,
    /// `articles/<slugified-title>.html`, falling back to the id for empty slugs.
    Title,
}

/// Build configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Output directory for the generated site.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Location of the render cache file.
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    /// Output path style for articles.
    #[serde(default)]
    pub slug: SlugStyle,

    /// Syntax highlighting theme name.
    #[serde(default = "default_syntax_theme")]
    pub syntax_theme: String,

    /// Keep each article's raw markdown as `<archive_dir>/<id>.md`.
    ///
    /// Lives outside the output tree, usually next to the cache.
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,
}

/// Theme settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeConfig {
    /// Initial color mode (`dark` or `light`).
    #[serde(default = "default_theme_mode")]
    pub mode: String,

    /// Accent color.
    #[serde(default = "default_primary_color")]
    pub primary_color: String,
}

/// A floating menu entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuEntry {
    /// Display name.
    pub name: String,

    /// Link target.
    pub url: String,

    /// Optional icon name or URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Special-card rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialConfig {
    /// Heading of the specials section.
    #[serde(default = "default_special_name")]
    pub name: String,

    /// Extra labels marking an article as special.
    #[serde(default)]
    pub labels: Vec<String>,

    /// Fallback card shown when no article is special.
    #[serde(default)]
    pub card: Option<SpecialCard>,
}

/// Fallback special card built from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialCard {
    /// Free-form information line.
    #[serde(default)]
    pub info: String,

    /// Copyright line.
    #[serde(default)]
    pub copyright: String,

    /// Date the site started running, `YYYY.MM.DD`.
    #[serde(default = "default_since")]
    pub since: String,

    /// Anything else.
    #[serde(default)]
    pub others: String,
}

/// Search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Whether a search index is written.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum excerpt length in characters.
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,

    /// File name of the index inside the output directory.
    #[serde(default = "default_search_file")]
    pub file_name: String,
}

/// Template overrides, relative to the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Single-article page template.
    #[serde(default)]
    pub article: Option<PathBuf>,

    /// Listing/home page template.
    #[serde(default)]
    pub listing: Option<PathBuf>,
}

/// The subset of configuration that shapes rendered article pages.
#[derive(Debug, Serialize)]
pub struct RenderSettings<'a> {
    pub site: &'a SiteInfo,
    pub theme: &'a ThemeConfig,
    pub menu: &'a [MenuEntry],
    pub slug: SlugStyle,
    pub syntax_theme: &'a str,
    pub search_file: &'a str,
}

// Default value functions
fn default_lang() -> String {
    "en".to_string()
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_per_page() -> u32 {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("docs")
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".issuesite/cache.json")
}

fn default_syntax_theme() -> String {
    "base16-ocean.dark".to_string()
}

fn default_theme_mode() -> String {
    "dark".to_string()
}

fn default_primary_color() -> String {
    "#e74c3c".to_string()
}

fn default_special_name() -> String {
    "Special".to_string()
}

fn default_since() -> String {
    "2023.01.01".to_string()
}

fn default_true() -> bool {
    true
}

fn default_excerpt_chars() -> usize {
    160
}

fn default_search_file() -> String {
    "search-index.json".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            repo: String::new(),
            api_base: default_api_base(),
            token_env: default_token_env(),
            per_page: default_per_page(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            timeout_secs: default_timeout_secs(),
            closed: ClosedPolicy::default(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            cache_path: default_cache_path(),
            slug: SlugStyle::default(),
            syntax_theme: default_syntax_theme(),
            archive_dir: None,
        }
    }
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            mode: default_theme_mode(),
            primary_color: default_primary_color(),
        }
    }
}

impl Default for SpecialConfig {
    fn default() -> Self {
        Self {
            name: default_special_name(),
            labels: Vec::new(),
            card: None,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            excerpt_chars: default_excerpt_chars(),
            file_name: default_search_file(),
        }
    }
}

impl SiteConfig {
    /// Build a configuration with defaults for everything but the site title.
    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            site: SiteInfo {
                title: title.into(),
                description: None,
                author: None,
                avatar: None,
                favicon: None,
                base_url: String::new(),
                lang: default_lang(),
            },
            source: SourceConfig::default(),
            build: BuildConfig::default(),
            theme: ThemeConfig::default(),
            menu: Vec::new(),
            special: SpecialConfig::default(),
            search: SearchConfig::default(),
            templates: TemplateConfig::default(),
            base_dir: PathBuf::new(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let mut config: SiteConfig = toml::from_str(&content).map_err(|e| {
            CoreError::config_with_source(
                format!("Failed to parse config file: {}", path.display()),
                e,
            )
        })?;

        config.base_dir = base_dir_of(path);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, layering `ISSUESITE__SECTION__KEY` environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("ISSUESITE").separator("__"))
            .build()?;

        let mut config: SiteConfig = settings.try_deserialize()?;
        config.base_dir = base_dir_of(path);
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.site.title.trim().is_empty() {
            return Err(CoreError::config("site.title cannot be empty"));
        }

        if !self.source.repo.is_empty() {
            let parts: Vec<_> = self.source.repo.split('/').collect();
            if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
                return Err(CoreError::config(format!(
                    "source.repo must look like owner/name, got {:?}",
                    self.source.repo
                )));
            }
        }

        if !(1..=100).contains(&self.source.per_page) {
            return Err(CoreError::config("source.per_page must be between 1 and 100"));
        }

        if self.search.excerpt_chars == 0 {
            return Err(CoreError::config("search.excerpt_chars must be positive"));
        }

        let file_name = Path::new(&self.search.file_name);
        if self.search.file_name.is_empty()
            || file_name.components().count() != 1
            || self.search.file_name == "index.html"
        {
            return Err(CoreError::config(format!(
                "search.file_name must be a plain file name other than index.html, got {:?}",
                self.search.file_name
            )));
        }

        if let Some(archive) = &self.build.archive_dir
            && self
                .resolve(archive)
                .starts_with(self.resolve(&self.build.output_dir))
        {
            return Err(CoreError::config(
                "build.archive_dir must be outside build.output_dir",
            ));
        }

        for entry in &self.menu {
            if entry.name.trim().is_empty() {
                return Err(CoreError::config("menu entries need a name"));
            }
        }

        if self.site.base_url.ends_with('/') {
            tracing::warn!("site.base_url should not have a trailing slash");
        }

        Ok(())
    }

    /// Whether an article carrying these labels is shown as a special card.
    pub fn is_special<'a>(&self, labels: impl IntoIterator<Item = &'a String>) -> bool {
        labels.into_iter().any(|label| {
            BUILTIN_SPECIAL_LABELS.contains(&label.as_str())
                || self.special.labels.iter().any(|l| l == label)
        })
    }

    /// All labels that mark an article as special, built-ins first.
    pub fn special_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = BUILTIN_SPECIAL_LABELS.iter().map(|l| l.to_string()).collect();
        for label in &self.special.labels {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }
        labels
    }

    /// Resolve a path from the configuration against the configuration directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Settings that affect the bytes of rendered article pages.
    pub fn render_settings(&self) -> RenderSettings<'_> {
        RenderSettings {
            site: &self.site,
            theme: &self.theme,
            menu: &self.menu,
            slug: self.build.slug,
            syntax_theme: &self.build.syntax_theme,
            search_file: &self.search.file_name,
        }
    }

    /// Get the full URL for a path.
    pub fn url_for(&self, path: &str) -> String {
        let base = self.site.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if base.is_empty() {
            path.to_string()
        } else {
            format!("{base}/{path}")
        }
    }
}

fn base_dir_of(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
