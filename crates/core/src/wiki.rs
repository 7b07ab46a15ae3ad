//! Wiki page validation, link rewriting, pagination, and engine settings.
//!
//! Pure functions only; the revision engine and the HTTP layer both call
//! into this module.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Limits and defaults
// ---------------------------------------------------------------------------

/// Maximum title length in characters.
pub const MAX_TITLE_LEN: usize = 50;

/// Maximum edit summary length in characters.
pub const MAX_SUMMARY_LEN: usize = 100;

/// Maximum page content length in characters.
pub const MAX_CONTENT_LEN: usize = 100_000;

/// Characters that may never appear in a title: wiki-link and markup
/// metacharacters plus path separators.
pub const DISALLOWED_TITLE_CHARS: &[char] = &['(', ')', '[', ']', '*', '_', '`', '/', '\\'];

/// Summary recorded for the first event of a page when none is given.
pub const SUMMARY_CREATE: &str = "create";

/// Summary recorded for later events when none is given.
pub const SUMMARY_EDIT: &str = "edit";

/// Default edit lease length.
pub const DEFAULT_LEASE_SECS: i64 = 60;

/// Default rows per history or search page.
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Default title offered when the wiki has no pages.
pub const DEFAULT_HOME_TITLE: &str = "Home";

/// Summary recorded when a page is reverted to `event`.
pub fn rehash_summary(event: i32) -> String {
    format!("rehash({event})")
}

// ---------------------------------------------------------------------------
// Engine settings
// ---------------------------------------------------------------------------

/// Runtime knobs for the revision engine, passed explicitly to
/// [`WikiService`](crate::service::WikiService).
#[derive(Debug, Clone)]
pub struct WikiConfig {
    /// How long an edit lease lasts before anyone may reclaim it.
    pub lease: chrono::Duration,
    pub page_size: i64,
    pub home_title: String,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            lease: chrono::Duration::seconds(DEFAULT_LEASE_SECS),
            page_size: DEFAULT_PAGE_SIZE,
            home_title: DEFAULT_HOME_TITLE.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a page title (non-empty, <= 50 chars, no disallowed characters).
///
/// Titles are rejected, never rewritten: a title that fails here is handed
/// back to the caller unchanged.
pub fn validate_title(title: &str) -> Result<(), CoreError> {
    if title.trim().is_empty() {
        return Err(CoreError::Validation("Title must not be empty".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(CoreError::Validation(format!(
            "Title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    if let Some(c) = title
        .chars()
        .find(|c| DISALLOWED_TITLE_CHARS.contains(c) || c.is_control())
    {
        return Err(CoreError::Validation(format!(
            "Title must not contain {:?}",
            c
        )));
    }
    Ok(())
}

/// Validate an edit summary (<= 100 chars; empty is allowed).
pub fn validate_summary(summary: &str) -> Result<(), CoreError> {
    if summary.chars().count() > MAX_SUMMARY_LEN {
        return Err(CoreError::Validation(format!(
            "Summary must be at most {MAX_SUMMARY_LEN} characters"
        )));
    }
    Ok(())
}

/// Validate page content (<= 100 000 chars).
pub fn validate_content(content: &str) -> Result<(), CoreError> {
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(CoreError::Validation(format!(
            "Content must be at most {MAX_CONTENT_LEN} characters"
        )));
    }
    Ok(())
}

/// The summary to record: the caller's, or `default` when blank.
pub fn summary_or(summary: &str, default: &str) -> String {
    let trimmed = summary.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

static WIKI_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([^()\[\]\n\r*_`/\\]*)\]\]").expect("valid regex")
});

/// Route of a page in the web UI.
pub fn page_path(title: &str) -> String {
    format!("/wiki/{}", encode_path_segment(title))
}

/// Turn every `[[Title]]` into a markdown link to that page.
pub fn rewrite_links(content: &str) -> String {
    WIKI_LINK_RE
        .replace_all(content, |caps: &regex::Captures| {
            let title = &caps[1];
            format!("[{title}]({})", page_path(title))
        })
        .into_owned()
}

/// Percent-encode everything outside the URI unreserved set.
pub fn encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'~' | b'_') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// Number of pages needed for `total` rows (at least 1).
pub fn last_page(total: i64, page_size: i64) -> i64 {
    if total <= 0 || page_size <= 0 {
        return 1;
    }
    (total + page_size - 1) / page_size
}

/// Clamp a requested page number into `1..=last`.
pub fn clamp_page(requested: i64, last: i64) -> i64 {
    requested.clamp(1, last.max(1))
}

/// Row offset of a 1-based page number.
pub fn page_offset(page: i64, page_size: i64) -> i64 {
    (page.max(1) - 1) * page_size
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
