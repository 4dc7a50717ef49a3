//! Article and listing page rendering.
//!
//! Rendering is a pure function of the article and the run's configuration:
//! no clocks, no randomness, no iteration over unordered maps. The same
//! inputs always produce the same bytes.

use std::collections::BTreeMap;

use issuesite_core::{
    Article, ContentHash, SiteConfig, SlugStyle,
    config::MenuEntry,
    meta::{IssueMeta, extract_issue_meta},
};
use issuesite_parser::{MarkdownRenderer, RenderWarning, SyntaxHighlighter, html_escape};
use issuesite_search::excerpt;
use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    error::ConfigError,
    template::{ARTICLE_TEMPLATE, LISTING_TEMPLATE, TemplateContext, TemplateError, TemplateRegistry},
};

/// Path of the listing page inside the output tree.
pub const LISTING_PATH: &str = "index.html";

/// Render errors. Templates are validated up front, so these point at a bug
/// rather than at bad input.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("cannot serialize page data: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for rendering.
pub type Result<T> = std::result::Result<T, RenderError>;

/// A finished page and where it goes, relative to the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlDocument {
    pub path: String,
    pub contents: String,
}

/// One rendered article page.
#[derive(Debug, Clone)]
pub struct RenderedArticle {
    pub id: u64,
    /// Hash of the article this page was rendered from.
    pub content_hash: ContentHash,
    pub document: HtmlDocument,
    /// Problems that degraded the page without blocking it.
    pub warnings: Vec<RenderWarning>,
}

/// Card data embedded in the listing as JSON.
#[derive(Debug, Serialize)]
struct ListingItem<'a> {
    id: u64,
    title: &'a str,
    summary: String,
    vertical_title: String,
    labels: Vec<&'a str>,
    url: String,
    created_at: String,
    updated_at: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    archived: bool,
}

/// Renders pages from articles using the configured templates.
#[derive(Debug)]
pub struct Renderer<'a> {
    config: &'a SiteConfig,
    templates: &'a TemplateRegistry,
    markdown: MarkdownRenderer,
}

impl<'a> Renderer<'a> {
    /// Create a renderer, loading the configured syntax theme.
    pub fn new(
        config: &'a SiteConfig,
        templates: &'a TemplateRegistry,
    ) -> std::result::Result<Self, ConfigError> {
        let highlighter = SyntaxHighlighter::with_theme(&config.build.syntax_theme)?;
        Ok(Self {
            config,
            templates,
            markdown: MarkdownRenderer::new(highlighter),
        })
    }

    pub fn markdown(&self) -> &MarkdownRenderer {
        &self.markdown
    }

    /// Digest of everything besides the article that shapes article pages.
    ///
    /// Stored in the cache; a different value means every cached page was
    /// produced by a different setup and must be rewritten.
    pub fn fingerprint(&self) -> Result<String> {
        let settings = serde_json::to_string(&self.config.render_settings())?;
        let template = self
            .templates
            .get(ARTICLE_TEMPLATE)
            .ok_or_else(|| TemplateError::NotFound(ARTICLE_TEMPLATE.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
        hasher.update([0]);
        hasher.update(settings.as_bytes());
        hasher.update([0]);
        hasher.update(self.config.search.excerpt_chars.to_le_bytes());
        hasher.update(template.source().as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// Render a single article page.
    pub fn render(&self, article: &Article) -> Result<RenderedArticle> {
        let config = self.config;
        let meta = extract_issue_meta(&article.body);
        let rendered = self.markdown.render(&meta.body);
        for warning in &rendered.warnings {
            warn!(id = article.id, %warning, "article rendered degraded");
        }

        let ctx = self
            .base_context(true)
            .with_var("title", html_escape(&article.title))
            .with_var("id", article.id.to_string())
            .with_var("body_html", rendered.html)
            .with_var("labels", labels_html(article.labels.iter().map(String::as_str)))
            .with_var("created_at", article.created_at.format("%Y-%m-%d").to_string())
            .with_var(
                "created_at_iso",
                article
                    .created_at
                    .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            )
            .with_var("home_url", html_escape(&site_link(config, LISTING_PATH, true)))
            .with_var("description", escape_opt(config.site.description.as_deref()))
            .with_var("vertical_title", html_escape(&self.vertical_title(article, &meta)))
            .with_var("summary", html_escape(&self.summary(&meta)));

        let contents = self.templates.render(ARTICLE_TEMPLATE, &ctx)?;
        let path = article.output_path(config.build.slug);
        debug!(id = article.id, path = %path, "rendered article");

        Ok(RenderedArticle {
            id: article.id,
            content_hash: article.content_hash.clone(),
            document: HtmlDocument { path, contents },
            warnings: rendered.warnings,
        })
    }

    /// Render many articles in parallel, keeping input order.
    pub fn render_all(&self, articles: &[&Article]) -> Result<Vec<RenderedArticle>> {
        articles.par_iter().map(|article| self.render(article)).collect()
    }

    /// Render the home page from the full current article set.
    ///
    /// Articles are ordered by update time, newest first, ties by id.
    /// Special articles go to the specials section instead of the list.
    pub fn render_listing(&self, articles: &[Article]) -> Result<HtmlDocument> {
        let config = self.config;

        let mut sorted: Vec<&Article> = articles.iter().collect();
        sorted.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));

        let (specials, regular): (Vec<&Article>, Vec<&Article>) = sorted
            .into_iter()
            .partition(|article| config.is_special(&article.labels));

        let special_items: Vec<ListingItem<'_>> =
            specials.iter().map(|a| self.listing_item(a)).collect();
        let regular_items: Vec<ListingItem<'_>> =
            regular.iter().map(|a| self.listing_item(a)).collect();

        let specials_html = if special_items.is_empty() {
            config
                .special
                .card
                .as_ref()
                .map(|card| fallback_card_html(&config.special.name, card))
                .unwrap_or_default()
        } else {
            special_items.iter().map(|item| card_html(item, true)).collect()
        };
        let articles_html: String = regular_items.iter().map(|item| card_html(item, false)).collect();

        let ctx = self
            .base_context(false)
            .with_var(
                "site_description",
                escape_opt(config.site.description.as_deref()),
            )
            .with_var("avatar", escape_opt(config.site.avatar.as_deref()))
            .with_var("specials_name", html_escape(&config.special.name))
            .with_var("specials_html", specials_html)
            .with_var("articles_html", articles_html)
            .with_var("articles_json", script_json(&regular_items)?)
            .with_var("specials_json", script_json(&special_items)?)
            .with_var("menu_json", script_json(&config.menu)?)
            .with_var("special_labels_json", script_json(&config.special_labels())?)
            .with_var("article_count", articles.len().to_string());

        let contents = self.templates.render(LISTING_TEMPLATE, &ctx)?;
        debug!(
            specials = special_items.len(),
            articles = regular_items.len(),
            "rendered listing"
        );

        Ok(HtmlDocument {
            path: LISTING_PATH.to_string(),
            contents,
        })
    }

    /// Variables shared by both templates.
    fn base_context(&self, from_article: bool) -> TemplateContext {
        let config = self.config;
        TemplateContext::new()
            .with_var("lang", html_escape(&config.site.lang))
            .with_var("site_title", html_escape(&config.site.title))
            .with_var("author", escape_opt(config.site.author.as_deref()))
            .with_var("favicon", escape_opt(config.site.favicon.as_deref()))
            .with_var("theme_mode", html_escape(&config.theme.mode))
            .with_var("primary_color", html_escape(&config.theme.primary_color))
            .with_var("nav", nav_html(config, &config.menu, from_article))
            .with_var(
                "search_url",
                html_escape(&site_link(config, &config.search.file_name, from_article)),
            )
    }

    fn listing_item<'b>(&self, article: &'b Article) -> ListingItem<'b> {
        let meta = extract_issue_meta(&article.body);
        ListingItem {
            id: article.id,
            title: &article.title,
            summary: self.summary(&meta),
            vertical_title: self.vertical_title(article, &meta),
            labels: article.labels.iter().map(String::as_str).collect(),
            url: self.config.url_for(&article.output_path(self.config.build.slug)),
            created_at: article.created_at.format("%Y-%m-%d").to_string(),
            updated_at: article.updated_at.format("%Y-%m-%d").to_string(),
            archived: article.is_archived(),
        }
    }

    fn summary(&self, meta: &IssueMeta) -> String {
        match &meta.summary {
            Some(summary) => summary.clone(),
            None => excerpt(
                &self.markdown.plain_text(&meta.body),
                self.config.search.excerpt_chars,
            ),
        }
    }

    fn vertical_title(&self, article: &Article, meta: &IssueMeta) -> String {
        meta.vertical_title
            .clone()
            .unwrap_or_else(|| article.title.clone())
    }
}

/// Fail if two articles would be written to the same file.
pub fn check_slug_collisions(
    articles: &[Article],
    style: SlugStyle,
) -> std::result::Result<(), ConfigError> {
    let mut by_path: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    for article in articles {
        by_path
            .entry(article.output_path(style))
            .or_default()
            .push(article.id);
    }

    let collisions: Vec<(String, Vec<u64>)> = by_path
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(path, mut ids)| {
            ids.sort_unstable();
            (path, ids)
        })
        .collect();

    if collisions.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::SlugCollision(collisions))
    }
}

/// A link to a site-relative path as seen from a page.
///
/// Absolute URLs and anchors pass through. With a base URL every link is
/// absolute; otherwise article pages, which live one directory down, get `../`.
fn site_link(config: &SiteConfig, path: &str, from_article: bool) -> String {
    if !is_site_relative(path) {
        path.to_string()
    } else if !config.site.base_url.is_empty() {
        config.url_for(path)
    } else if from_article {
        format!("../{path}")
    } else {
        path.to_string()
    }
}

fn is_site_relative(url: &str) -> bool {
    !(url.is_empty()
        || url.starts_with('/')
        || url.starts_with('#')
        || url.starts_with("mailto:")
        || url.contains("://"))
}

fn escape_opt(value: Option<&str>) -> String {
    value.map(html_escape).unwrap_or_default()
}

fn nav_html(config: &SiteConfig, menu: &[MenuEntry], from_article: bool) -> String {
    menu.iter()
        .map(|entry| {
            let href = html_escape(&site_link(config, &entry.url, from_article));
            let name = html_escape(&entry.name);
            match &entry.icon {
                Some(icon) => format!(
                    "<a href=\"{href}\" data-icon=\"{}\">{name}</a>\n",
                    html_escape(icon)
                ),
                None => format!("<a href=\"{href}\">{name}</a>\n"),
            }
        })
        .collect()
}

fn labels_html<'l>(labels: impl IntoIterator<Item = &'l str>) -> String {
    let items: String = labels
        .into_iter()
        .map(|label| format!("<li>{}</li>", html_escape(label)))
        .collect();
    if items.is_empty() {
        String::new()
    } else {
        format!("<ul class=\"labels\">{items}</ul>")
    }
}

fn card_html(item: &ListingItem<'_>, special: bool) -> String {
    let mut class = String::from("card");
    if special {
        class.push_str(" special");
    }
    if item.archived {
        class.push_str(" archived");
    }

    format!(
        "<a class=\"{class}\" href=\"{url}\" data-id=\"{id}\">\
         <div class=\"vertical-title\">{vertical}</div>\
         <div><h3>{title}</h3><p>{summary}</p>\
         <time datetime=\"{created}\">{created}</time>{labels}</div></a>\n",
        url = html_escape(&item.url),
        id = item.id,
        vertical = html_escape(&item.vertical_title),
        title = html_escape(item.title),
        summary = html_escape(&item.summary),
        created = item.created_at,
        labels = labels_html(item.labels.iter().copied()),
    )
}

fn fallback_card_html(name: &str, card: &issuesite_core::config::SpecialCard) -> String {
    let mut lines = Vec::new();
    for text in [&card.info, &card.copyright] {
        if !text.is_empty() {
            lines.push(format!("<p>{}</p>", html_escape(text)));
        }
    }
    lines.push(format!(
        "<p>Running <span data-since=\"{since}\">since {since}</span></p>",
        since = html_escape(&card.since)
    ));
    if !card.others.is_empty() {
        lines.push(format!("<p>{}</p>", html_escape(&card.others)));
    }

    format!(
        "<div class=\"card special fallback\"><div><h3>{}</h3>{}</div></div>\n",
        html_escape(name),
        lines.concat()
    )
}

/// JSON safe to embed in a `<script>` element.
fn script_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use issuesite_core::{ArticleState, config::SpecialCard};

    use super::*;

    fn article(id: u64, title: &str, body: &str, labels: &[&str], day: u32) -> Article {
        Article::new(
            id,
            title,
            body,
            labels.iter().map(|l| l.to_string()),
            Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, day, 8, 0, 0).unwrap(),
            ArticleState::Published,
        )
    }

    fn config() -> SiteConfig {
        let mut config = SiteConfig::with_title("My <Notes>");
        config.menu.push(MenuEntry {
            name: "About".to_string(),
            url: "about.html".to_string(),
            icon: None,
        });
        config.menu.push(MenuEntry {
            name: "GitHub".to_string(),
            url: "https://github.com/o/r".to_string(),
            icon: Some("github".to_string()),
        });
        config
    }

    #[test]
    fn test_render_article() {
        let config = config();
        let templates = TemplateRegistry::new();
        let renderer = Renderer::new(&config, &templates).unwrap();

        let page = renderer
            .render(&article(
                7,
                "Hello & welcome",
                "!vml-summary <span>A short note</span>\nline one\nline two",
                &["rust"],
                3,
            ))
            .unwrap();

        assert_eq!(page.document.path, "articles/7.html");
        assert!(page.warnings.is_empty());
        let html = &page.document.contents;
        assert!(html.contains("<h1>Hello &amp; welcome</h1>"));
        assert!(html.contains("line one<br />\nline two"));
        assert!(html.contains("content=\"A short note\""));
        assert!(!html.contains("!vml-summary"));
        assert!(html.contains("<ul class=\"labels\"><li>rust</li></ul>"));
        assert!(html.contains("<time datetime=\"2024-01-01T08:00:00Z\">2024-01-01</time>"));
        assert!(html.contains("href=\"../about.html\""));
        assert!(html.contains("href=\"https://github.com/o/r\" data-icon=\"github\""));
        assert!(html.contains("href=\"../index.html\""));
        assert!(html.contains("content=\"../search-index.json\""));
        assert!(html.contains("My &lt;Notes&gt;"));
        // Vertical title defaults to the title.
        assert!(html.contains("<div class=\"vertical-title\">Hello &amp; welcome</div>"));
    }

    #[test]
    fn test_render_is_deterministic_and_ignores_update_time() {
        let config = config();
        let templates = TemplateRegistry::new();
        let renderer = Renderer::new(&config, &templates).unwrap();

        let a = article(1, "T", "```rust\nfn main() {}\n```", &["x", "y"], 3);
        let mut touched = a.clone();
        touched.updated_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        touched.state = ArticleState::Archived;

        let first = renderer.render(&a).unwrap().document;
        let second = renderer.render(&a).unwrap().document;
        let third = renderer.render(&touched).unwrap().document;
        assert_eq!(first, second);
        assert_eq!(first, third);
    }

    #[test]
    fn test_render_degraded_article() {
        let config = config();
        let templates = TemplateRegistry::new();
        let renderer = Renderer::new(&config, &templates).unwrap();

        let page = renderer
            .render(&article(2, "Broken", "intro\n\n```\nnever closed", &[], 1))
            .unwrap();
        assert_eq!(page.warnings.len(), 1);
        assert!(page.document.contents.contains("intro"));
        assert!(page.document.contents.contains("never closed"));
    }

    #[test]
    fn test_title_slug_path() {
        let mut config = config();
        config.build.slug = SlugStyle::Title;
        let templates = TemplateRegistry::new();
        let renderer = Renderer::new(&config, &templates).unwrap();

        let page = renderer.render(&article(3, "Hello World", "", &[], 1)).unwrap();
        assert_eq!(page.document.path, "articles/hello-world.html");
    }

    #[test]
    fn test_unknown_theme_is_config_error() {
        let mut config = config();
        config.build.syntax_theme = "no-such-theme".to_string();
        let templates = TemplateRegistry::new();
        assert!(matches!(
            Renderer::new(&config, &templates),
            Err(ConfigError::Theme(_))
        ));
    }

    #[test]
    fn test_listing_order_and_specials() {
        let config = config();
        let templates = TemplateRegistry::new();
        let renderer = Renderer::new(&config, &templates).unwrap();

        let articles = vec![
            article(1, "Old", "a", &[], 1),
            article(2, "Newest", "b", &[], 9),
            article(3, "Tie low", "c", &[], 5),
            article(4, "Pinned", "d", &["top"], 2),
            article(5, "Tie high", "e", &[], 5),
        ];
        let listing = renderer.render_listing(&articles).unwrap();
        assert_eq!(listing.path, "index.html");

        let html = &listing.contents;
        let pos = |needle: &str| html.find(needle).unwrap_or_else(|| panic!("{needle} missing"));
        assert!(pos("<h3>Newest</h3>") < pos("<h3>Tie low</h3>"));
        assert!(pos("<h3>Tie low</h3>") < pos("<h3>Tie high</h3>"));
        assert!(pos("<h3>Tie high</h3>") < pos("<h3>Old</h3>"));
        assert!(html.contains("class=\"card special\" href=\"articles/4.html\""));
        assert!(html.contains("Articles (5)"));
        assert!(html.contains(r#"<script type="application/json" id="special-labels-data">["special","top"]</script>"#));
    }

    #[test]
    fn test_listing_fallback_card() {
        let mut config = config();
        config.special.card = Some(SpecialCard {
            info: "Hi".to_string(),
            copyright: "(c) me".to_string(),
            since: "2023.01.01".to_string(),
            others: String::new(),
        });
        let templates = TemplateRegistry::new();
        let renderer = Renderer::new(&config, &templates).unwrap();

        let html = renderer
            .render_listing(&[article(1, "A", "a", &[], 1)])
            .unwrap()
            .contents;
        assert!(html.contains("class=\"card special fallback\""));
        assert!(html.contains("data-since=\"2023.01.01\""));

        let html = renderer
            .render_listing(&[article(1, "A", "a", &["special"], 1)])
            .unwrap()
            .contents;
        assert!(!html.contains("fallback"));
    }

    #[test]
    fn test_listing_json_is_script_safe() {
        let config = config();
        let templates = TemplateRegistry::new();
        let renderer = Renderer::new(&config, &templates).unwrap();

        let html = renderer
            .render_listing(&[article(1, "</script><b>", "x", &[], 1)])
            .unwrap()
            .contents;
        assert!(!html.contains("</script><b>"));
        assert!(html.contains(r#""title":"<\/script><b>""#));
    }

    #[test]
    fn test_fingerprint_tracks_render_settings() {
        let config = config();
        let templates = TemplateRegistry::new();
        let base = Renderer::new(&config, &templates).unwrap().fingerprint().unwrap();
        assert_eq!(
            base,
            Renderer::new(&config, &templates).unwrap().fingerprint().unwrap()
        );

        let mut themed = config.clone();
        themed.theme.primary_color = "#000000".to_string();
        assert_ne!(
            base,
            Renderer::new(&themed, &templates).unwrap().fingerprint().unwrap()
        );

        // Listing-only settings do not invalidate article pages.
        let mut specials = config.clone();
        specials.special.name = "Pinned".to_string();
        assert_eq!(
            base,
            Renderer::new(&specials, &templates).unwrap().fingerprint().unwrap()
        );
    }

    #[test]
    fn test_slug_collisions() {
        let articles = vec![
            article(3, "Hello", "", &[], 1),
            article(9, "hello!", "", &[], 1),
            article(4, "Other", "", &[], 1),
        ];
        assert!(check_slug_collisions(&articles, SlugStyle::Id).is_ok());

        let err = check_slug_collisions(&articles, SlugStyle::Title).unwrap_err();
        match err {
            ConfigError::SlugCollision(collisions) => {
                assert_eq!(collisions, vec![("articles/hello.html".to_string(), vec![3, 9])]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_site_link() {
        let mut config = SiteConfig::with_title("T");
        assert_eq!(site_link(&config, "about.html", true), "../about.html");
        assert_eq!(site_link(&config, "about.html", false), "about.html");
        assert_eq!(site_link(&config, "#top", true), "#top");
        assert_eq!(site_link(&config, "/abs", true), "/abs");

        config.site.base_url = "https://x.dev/blog".to_string();
        assert_eq!(site_link(&config, "about.html", true), "https://x.dev/blog/about.html");
    }
}
