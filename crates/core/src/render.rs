//! Content rendering: source markup to sanitized HTML and plain text.
//!
//! Rendering runs once per successful write and its output is cached on the
//! page row. The engine only depends on the [`RenderTransform`] trait.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::CoreError;
use crate::wiki::rewrite_links;

/// Derived caches for one piece of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub html: String,
    pub text: String,
}

/// A pure `content -> (html, text)` transform.
pub trait RenderTransform: Send + Sync {
    fn render(&self, content: &str) -> Result<Rendered, CoreError>;
}

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.*?)\s*#*\s*$").expect("valid regex"));
static CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("valid regex"));
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("valid regex"));
static STRONG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("valid regex"));
static EM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*]+)\*").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Schemes an absolute link may use.
const SAFE_SCHEMES: &[&str] = &["http://", "https://", "mailto:"];

/// The default renderer: a small markdown subset over escaped input.
///
/// Supported: ATX headings, paragraphs separated by blank lines, `[text](url)`
/// links, `**strong**`, `*em*` and `` `code` ``. Raw HTML in the source is
/// always escaped, and links to anything but the safe schemes render as
/// plain text.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupRenderer;

impl RenderTransform for MarkupRenderer {
    fn render(&self, content: &str) -> Result<Rendered, CoreError> {
        let source = rewrite_links(&escape_html(&content.replace("\r\n", "\n")));
        let html = render_blocks(&source);
        let text = html_to_text(&html);
        Ok(Rendered { html, text })
    }
}

fn render_blocks(source: &str) -> String {
    let mut blocks: Vec<String> = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();

    let flush = |paragraph: &mut Vec<&str>, blocks: &mut Vec<String>| {
        if !paragraph.is_empty() {
            blocks.push(format!("<p>{}</p>", render_inline(&paragraph.join("\n"))));
            paragraph.clear();
        }
    };

    for line in source.lines() {
        if line.trim().is_empty() {
            flush(&mut paragraph, &mut blocks);
        } else if let Some(caps) = HEADING_RE.captures(line) {
            flush(&mut paragraph, &mut blocks);
            let level = caps[1].len();
            blocks.push(format!("<h{level}>{}</h{level}>", render_inline(&caps[2])));
        } else {
            paragraph.push(line);
        }
    }
    flush(&mut paragraph, &mut blocks);

    blocks.join("\n")
}

fn render_inline(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = 0;
    for caps in CODE_RE.captures_iter(text) {
        let (Some(span), Some(code)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&render_spans(&text[rest..span.start()]));
        out.push_str("<code>");
        out.push_str(code.as_str());
        out.push_str("</code>");
        rest = span.end();
    }
    out.push_str(&render_spans(&text[rest..]));
    out
}

/// Links, strong and em, for text outside code spans.
fn render_spans(text: &str) -> String {
    let text = LINK_RE.replace_all(text, |caps: &Captures| {
        let (label, url) = (&caps[1], &caps[2]);
        if is_safe_link(url) {
            format!("<a href=\"{url}\">{label}</a>")
        } else {
            label.to_string()
        }
    });
    let text = STRONG_RE.replace_all(&text, "<strong>$1</strong>");
    EM_RE.replace_all(&text, "<em>$1</em>").into_owned()
}

/// Site-relative paths, fragments and the [`SAFE_SCHEMES`]. Protocol-relative
/// URLs (`//host`, `/\host`) leave the site and are refused.
fn is_safe_link(url: &str) -> bool {
    if url.starts_with("//") || url.starts_with("/\\") {
        return false;
    }
    if url.starts_with('/') || url.starts_with('#') {
        return true;
    }
    let lower = url.to_ascii_lowercase();
    SAFE_SCHEMES.iter().any(|scheme| lower.starts_with(scheme))
}

/// Escape the five HTML-significant characters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Strip tags and decode the entities [`escape_html`] produces.
pub fn html_to_text(html: &str) -> String {
    TAG_RE
        .replace_all(html, "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
