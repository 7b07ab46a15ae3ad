//! Repository for the `page_history` table.
//!
//! History rows are append-only; there is no update and no per-row delete.

use folio_core::page::NewHistoryEntry;
use folio_core::types::DbId;
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::history::HistoryRow;

/// Column list for `page_history` queries.
const COLUMNS: &str = "id, page_id, event, summary, title_patch, content_patch, written_at";

/// Provides append and read operations for page history.
pub struct HistoryRepo;

impl HistoryRepo {
    /// Append an entry within an existing transaction.
    pub async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        page_id: DbId,
        entry: &NewHistoryEntry,
    ) -> Result<HistoryRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO page_history \
                (page_id, event, summary, title_patch, content_patch, written_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, HistoryRow>(&query)
            .bind(page_id)
            .bind(entry.event)
            .bind(&entry.summary)
            .bind(&entry.title_patch)
            .bind(&entry.content_patch)
            .bind(entry.written_at)
            .fetch_one(&mut **tx)
            .await
    }

    /// Highest event number for a page, or 0 if it has none.
    pub async fn latest_event(pool: &PgPool, page_id: DbId) -> Result<i32, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COALESCE(MAX(event), 0) FROM page_history WHERE page_id = $1",
        )
        .bind(page_id)
        .fetch_one(pool)
        .await
    }

    /// Find a specific event of a page.
    pub async fn find(
        pool: &PgPool,
        page_id: DbId,
        event: i32,
    ) -> Result<Option<HistoryRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM page_history WHERE page_id = $1 AND event = $2"
        );
        sqlx::query_as::<_, HistoryRow>(&query)
            .bind(page_id)
            .bind(event)
            .fetch_optional(pool)
            .await
    }

    /// Events `1..=event` of a page, oldest first.
    pub async fn list_through(
        pool: &PgPool,
        page_id: DbId,
        event: i32,
    ) -> Result<Vec<HistoryRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM page_history \
             WHERE page_id = $1 AND event <= $2 \
             ORDER BY event ASC"
        );
        sqlx::query_as::<_, HistoryRow>(&query)
            .bind(page_id)
            .bind(event)
            .fetch_all(pool)
            .await
    }

    /// A page's history, newest first.
    pub async fn list(
        pool: &PgPool,
        page_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<HistoryRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM page_history \
             WHERE page_id = $1 \
             ORDER BY event DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, HistoryRow>(&query)
            .bind(page_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    pub async fn count(pool: &PgPool, page_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM page_history WHERE page_id = $1")
            .bind(page_id)
            .fetch_one(pool)
            .await
    }
}
