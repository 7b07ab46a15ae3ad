//! Row model for the `pages` table.

use folio_core::page::Page;
use folio_core::types::{DbId, LockToken, Timestamp};
use sqlx::FromRow;

/// A row from the `pages` table.
#[derive(Debug, Clone, FromRow)]
pub struct PageRow {
    pub id: DbId,
    pub title: String,
    pub content: String,
    pub rendered_html: String,
    pub plain_text: String,
    pub lock_token: Option<LockToken>,
    pub lock_expiry: Option<Timestamp>,
    pub last_written: Timestamp,
}

impl From<PageRow> for Page {
    fn from(row: PageRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            content: row.content,
            rendered_html: row.rendered_html,
            plain_text: row.plain_text,
            lock_token: row.lock_token,
            lock_expiry: row.lock_expiry,
            last_written: row.last_written,
        }
    }
}
