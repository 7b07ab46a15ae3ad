//! Row model for the `page_history` table.

use folio_core::page::HistoryEntry;
use folio_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `page_history` table.
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    pub id: DbId,
    pub page_id: DbId,
    pub event: i32,
    pub summary: String,
    pub title_patch: String,
    pub content_patch: String,
    pub written_at: Timestamp,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        Self {
            id: row.id,
            page_id: row.page_id,
            event: row.event,
            summary: row.summary,
            title_patch: row.title_patch,
            content_patch: row.content_patch,
            written_at: row.written_at,
        }
    }
}
