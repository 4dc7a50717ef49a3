//! Markdown rendering using pulldown-cmark.
//!
//! Issue bodies are rendered with comment semantics: a single newline is a
//! line break, tables are wrapped for horizontal scrolling, and untagged code
//! blocks are marked `language-plaintext`.

use std::fmt;

use pulldown_cmark::{Alignment, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::syntax::SyntaxHighlighter;

/// Deepest tag nesting rendered before the body is treated as malformed.
pub const MAX_NESTING: usize = 32;

/// A construct the renderer could not handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderFault {
    /// A fenced code block is never closed.
    UnterminatedCodeFence,
    /// Block or inline nesting exceeds [`MAX_NESTING`].
    NestingTooDeep { limit: usize },
}

impl fmt::Display for RenderFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedCodeFence => f.write_str("unterminated code fence"),
            Self::NestingTooDeep { limit } => write!(f, "nesting deeper than {limit} levels"),
        }
    }
}

/// Recoverable problem found while rendering a body.
///
/// Rendering stops at the fault; everything before it is rendered normally
/// and the rest of the source is shown escaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderWarning {
    /// 1-based source line of the fault.
    pub line: usize,
    pub fault: RenderFault,
}

impl fmt::Display for RenderWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.fault)
    }
}

/// Output of a render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    pub html: String,
    pub warnings: Vec<RenderWarning>,
}

/// Markdown renderer with syntax highlighting support.
#[derive(Debug)]
pub struct MarkdownRenderer {
    highlighter: SyntaxHighlighter,
    options: Options,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new(SyntaxHighlighter::default())
    }
}

impl MarkdownRenderer {
    /// Create a renderer using the given highlighter.
    pub fn new(highlighter: SyntaxHighlighter) -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);

        Self {
            highlighter,
            options,
        }
    }

    pub fn highlighter(&self) -> &SyntaxHighlighter {
        &self.highlighter
    }

    /// Render markdown to HTML.
    ///
    /// Deterministic: the same source always yields the same bytes.
    pub fn render(&self, source: &str) -> Rendered {
        let mut writer = HtmlWriter::new(&self.highlighter);
        let mut fault: Option<(usize, RenderFault)> = None;

        for (event, range) in Parser::new_ext(source, self.options).into_offset_iter() {
            if let Event::Start(tag) = &event {
                if writer.depth() >= MAX_NESTING {
                    fault = Some((
                        range.start,
                        RenderFault::NestingTooDeep { limit: MAX_NESTING },
                    ));
                    break;
                }
                if let Tag::CodeBlock(CodeBlockKind::Fenced(_)) = tag
                    && !is_fence_closed(&source[range.clone()])
                {
                    fault = Some((range.start, RenderFault::UnterminatedCodeFence));
                    break;
                }
            }
            writer.event(event);
        }

        let mut warnings = Vec::new();
        writer.close_all();
        if let Some((offset, fault)) = fault {
            let line = source[..offset].matches('\n').count() + 1;
            tracing::debug!(line, %fault, "stopping render at fault");
            writer.unrendered(&source[offset..]);
            warnings.push(RenderWarning { line, fault });
        }

        Rendered {
            html: writer.finish(),
            warnings,
        }
    }

    /// Extract readable text, dropping markup and raw HTML.
    ///
    /// Whitespace is collapsed to single spaces.
    pub fn plain_text(&self, source: &str) -> String {
        let mut text = String::new();

        for event in Parser::new_ext(source, self.options) {
            match event {
                Event::Text(t) | Event::Code(t) => text.push_str(&t),
                Event::SoftBreak | Event::HardBreak | Event::Rule => text.push(' '),
                Event::End(
                    TagEnd::Paragraph
                    | TagEnd::Heading(_)
                    | TagEnd::Item
                    | TagEnd::CodeBlock
                    | TagEnd::TableCell
                    | TagEnd::BlockQuote(_)
                    | TagEnd::FootnoteDefinition
                    | TagEnd::DefinitionListTitle
                    | TagEnd::DefinitionListDefinition,
                ) => text.push(' '),
                _ => {}
            }
        }

        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Whether a fenced code block's source ends with a matching closing fence.
fn is_fence_closed(block: &str) -> bool {
    let strip = |line: &str| -> String {
        line.trim_start_matches(|c: char| c == '>' || c.is_whitespace())
            .trim_end()
            .to_string()
    };

    let mut lines = block.trim_end().lines();
    let Some(opening) = lines.next().map(strip) else {
        return false;
    };
    let Some(fence_char) = opening.chars().next() else {
        return false;
    };
    let fence_len = opening.chars().take_while(|&c| c == fence_char).count();

    match lines.last().map(strip) {
        Some(closing) => {
            closing.chars().count() >= fence_len && closing.chars().all(|c| c == fence_char)
        }
        None => false,
    }
}

#[derive(Debug)]
struct CodeBuffer {
    lang: Option<String>,
    text: String,
}

#[derive(Debug)]
struct ImageBuffer {
    src: String,
    title: String,
    alt: String,
}

/// Incremental HTML output with a stack of open tags.
struct HtmlWriter<'a> {
    highlighter: &'a SyntaxHighlighter,
    out: String,
    open: Vec<TagEnd>,
    code: Option<CodeBuffer>,
    image: Option<ImageBuffer>,
    image_depth: usize,
    alignments: Vec<Alignment>,
    cell: usize,
    in_table_head: bool,
    table_body_open: bool,
}

impl<'a> HtmlWriter<'a> {
    fn new(highlighter: &'a SyntaxHighlighter) -> Self {
        Self {
            highlighter,
            out: String::new(),
            open: Vec::new(),
            code: None,
            image: None,
            image_depth: 0,
            alignments: Vec::new(),
            cell: 0,
            in_table_head: false,
            table_body_open: false,
        }
    }

    fn depth(&self) -> usize {
        self.open.len()
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => {
                self.open.push(tag.to_end());
                self.start(tag);
            }
            Event::End(end) => {
                self.open.pop();
                self.end(end);
            }
            Event::Text(text) => self.text(&text),
            Event::Code(code) => {
                if let Some(image) = self.image.as_mut() {
                    image.alt.push_str(&code);
                } else {
                    self.out.push_str("<code>");
                    self.out.push_str(&html_escape(&code));
                    self.out.push_str("</code>");
                }
            }
            Event::Html(raw) | Event::InlineHtml(raw) => {
                if let Some(code) = self.code.as_mut() {
                    code.text.push_str(&raw);
                } else {
                    self.out.push_str(&raw);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some(image) = self.image.as_mut() {
                    image.alt.push(' ');
                } else {
                    self.out.push_str("<br />\n");
                }
            }
            Event::Rule => self.out.push_str("<hr />\n"),
            Event::FootnoteReference(name) => {
                let name = html_escape(&name);
                self.out.push_str(&format!(
                    "<sup class=\"footnote-ref\"><a href=\"#fn-{name}\">[{name}]</a></sup>"
                ));
            }
            Event::TaskListMarker(checked) => {
                self.out.push_str(if checked {
                    "<input type=\"checkbox\" checked disabled /> "
                } else {
                    "<input type=\"checkbox\" disabled /> "
                });
            }
            Event::InlineMath(math) => {
                self.out.push_str(&format!(
                    "<span class=\"math inline\">\\({}\\)</span>",
                    html_escape(&math)
                ));
            }
            Event::DisplayMath(math) => {
                self.out.push_str(&format!(
                    "<div class=\"math display\">\\[{}\\]</div>",
                    html_escape(&math)
                ));
            }
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(code) = self.code.as_mut() {
            code.text.push_str(text);
        } else if let Some(image) = self.image.as_mut() {
            image.alt.push_str(text);
        } else {
            self.out.push_str(&html_escape(text));
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        // Markup inside image descriptions only contributes alt text.
        if self.image.is_some() && !matches!(tag, Tag::Image { .. }) {
            return;
        }
        let html = match tag {
            Tag::Paragraph => "<p>".to_string(),
            Tag::Heading { level, id, .. } => {
                let id_attr = id
                    .map(|i| format!(" id=\"{}\"", html_escape(&i)))
                    .unwrap_or_default();
                format!("<h{}{id_attr}>", level as u8)
            }
            Tag::BlockQuote(_) => "<blockquote>\n".to_string(),
            Tag::CodeBlock(kind) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .map(str::to_string),
                    CodeBlockKind::Indented => None,
                };
                self.code = Some(CodeBuffer {
                    lang,
                    text: String::new(),
                });
                String::new()
            }
            Tag::List(Some(1)) => "<ol>\n".to_string(),
            Tag::List(Some(start)) => format!("<ol start=\"{start}\">\n"),
            Tag::List(None) => "<ul>\n".to_string(),
            Tag::Item => "<li>".to_string(),
            Tag::FootnoteDefinition(name) => {
                format!("<div class=\"footnote\" id=\"fn-{}\">", html_escape(&name))
            }
            Tag::Table(alignments) => {
                self.alignments = alignments;
                self.table_body_open = false;
                "<div class=\"table-wrapper\"><table>\n".to_string()
            }
            Tag::TableHead => {
                self.in_table_head = true;
                self.cell = 0;
                "<thead><tr>".to_string()
            }
            Tag::TableRow => {
                self.cell = 0;
                if self.table_body_open {
                    "<tr>".to_string()
                } else {
                    self.table_body_open = true;
                    "<tbody>\n<tr>".to_string()
                }
            }
            Tag::TableCell => {
                let cell_tag = if self.in_table_head { "th" } else { "td" };
                let style = match self.alignments.get(self.cell) {
                    Some(Alignment::Left) => " style=\"text-align: left\"",
                    Some(Alignment::Center) => " style=\"text-align: center\"",
                    Some(Alignment::Right) => " style=\"text-align: right\"",
                    Some(Alignment::None) | None => "",
                };
                format!("<{cell_tag}{style}>")
            }
            Tag::Emphasis => "<em>".to_string(),
            Tag::Strong => "<strong>".to_string(),
            Tag::Strikethrough => "<del>".to_string(),
            Tag::Superscript => "<sup>".to_string(),
            Tag::Subscript => "<sub>".to_string(),
            Tag::Link {
                dest_url, title, ..
            } => {
                let title_attr = if title.is_empty() {
                    String::new()
                } else {
                    format!(" title=\"{}\"", html_escape(&title))
                };
                format!("<a href=\"{}\"{title_attr}>", html_escape(&dest_url))
            }
            Tag::Image {
                dest_url, title, ..
            } => {
                self.image_depth += 1;
                if self.image.is_none() {
                    self.image = Some(ImageBuffer {
                        src: dest_url.to_string(),
                        title: title.to_string(),
                        alt: String::new(),
                    });
                }
                String::new()
            }
            Tag::HtmlBlock | Tag::MetadataBlock(_) => String::new(),
            Tag::DefinitionList => "<dl>\n".to_string(),
            Tag::DefinitionListTitle => "<dt>".to_string(),
            Tag::DefinitionListDefinition => "<dd>".to_string(),
        };
        self.out.push_str(&html);
    }

    fn end(&mut self, end: TagEnd) {
        if self.image.is_some() && end != TagEnd::Image {
            return;
        }
        let html = match end {
            TagEnd::Paragraph => "</p>\n".to_string(),
            TagEnd::Heading(level) => format!("</h{}>\n", level as u8),
            TagEnd::BlockQuote(_) => "</blockquote>\n".to_string(),
            TagEnd::CodeBlock => match self.code.take() {
                Some(code) => self.highlighter.highlight(&code.text, code.lang.as_deref()),
                None => String::new(),
            },
            TagEnd::List(true) => "</ol>\n".to_string(),
            TagEnd::List(false) => "</ul>\n".to_string(),
            TagEnd::Item => "</li>\n".to_string(),
            TagEnd::FootnoteDefinition => "</div>\n".to_string(),
            TagEnd::Table => {
                let tbody = if self.table_body_open { "</tbody>\n" } else { "" };
                self.table_body_open = false;
                self.alignments.clear();
                format!("{tbody}</table></div>\n")
            }
            TagEnd::TableHead => {
                self.in_table_head = false;
                "</tr></thead>\n".to_string()
            }
            TagEnd::TableRow => "</tr>\n".to_string(),
            TagEnd::TableCell => {
                self.cell += 1;
                if self.in_table_head { "</th>" } else { "</td>" }.to_string()
            }
            TagEnd::Emphasis => "</em>".to_string(),
            TagEnd::Strong => "</strong>".to_string(),
            TagEnd::Strikethrough => "</del>".to_string(),
            TagEnd::Superscript => "</sup>".to_string(),
            TagEnd::Subscript => "</sub>".to_string(),
            TagEnd::Link => "</a>".to_string(),
            TagEnd::Image => {
                self.image_depth = self.image_depth.saturating_sub(1);
                let outermost = if self.image_depth == 0 {
                    self.image.take()
                } else {
                    None
                };
                match outermost {
                    Some(image) => {
                        let title_attr = if image.title.is_empty() {
                            String::new()
                        } else {
                            format!(" title=\"{}\"", html_escape(&image.title))
                        };
                        format!(
                            "<img src=\"{}\" alt=\"{}\"{title_attr} />",
                            html_escape(&image.src),
                            html_escape(&image.alt)
                        )
                    }
                    None => String::new(),
                }
            }
            TagEnd::HtmlBlock | TagEnd::MetadataBlock(_) => String::new(),
            TagEnd::DefinitionList => "</dl>\n".to_string(),
            TagEnd::DefinitionListTitle => "</dt>\n".to_string(),
            TagEnd::DefinitionListDefinition => "</dd>\n".to_string(),
        };
        self.out.push_str(&html);
    }

    /// Close every open tag, innermost first.
    fn close_all(&mut self) {
        while let Some(end) = self.open.pop() {
            self.end(end);
        }
    }

    fn unrendered(&mut self, rest: &str) {
        self.out.push_str("<pre class=\"unrendered\">");
        self.out.push_str(&html_escape(rest));
        self.out.push_str("</pre>\n");
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Escape HTML special characters.
pub fn html_escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
