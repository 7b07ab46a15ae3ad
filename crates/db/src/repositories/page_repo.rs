//! Repository for the `pages` table.
//!
//! The edit lease lives on the page row itself; `acquire_lock` is the single
//! conditional write that serializes editors.

use folio_core::page::{NewPage, PageCommit};
use folio_core::types::{DbId, LockToken, Timestamp};
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::page::PageRow;

/// Column list for `pages` queries.
const COLUMNS: &str = "id, title, content, rendered_html, plain_text, \
                       lock_token, lock_expiry, last_written";

/// Provides CRUD and lease operations for pages.
pub struct PageRepo;

impl PageRepo {
    /// Find a page by its exact title.
    pub async fn find_by_title(pool: &PgPool, title: &str) -> Result<Option<PageRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM pages WHERE title = $1");
        sqlx::query_as::<_, PageRow>(&query)
            .bind(title)
            .fetch_optional(pool)
            .await
    }

    /// Find a page by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<PageRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM pages WHERE id = $1");
        sqlx::query_as::<_, PageRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a page only if it carries exactly this lease.
    pub async fn find_locked(
        pool: &PgPool,
        title: &str,
        token: LockToken,
        expiry: Timestamp,
    ) -> Result<Option<PageRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM pages \
             WHERE title = $1 AND lock_token = $2 AND lock_expiry = $3"
        );
        sqlx::query_as::<_, PageRow>(&query)
            .bind(title)
            .bind(token)
            .bind(expiry)
            .fetch_optional(pool)
            .await
    }

    /// Insert a new, unlocked page within an existing transaction.
    pub async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        page: &NewPage,
    ) -> Result<PageRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO pages (title, content, rendered_html, plain_text, last_written) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PageRow>(&query)
            .bind(&page.title)
            .bind(&page.content)
            .bind(&page.rendered_html)
            .bind(&page.plain_text)
            .bind(page.written_at)
            .fetch_one(&mut **tx)
            .await
    }

    /// Write a page's new state and clear its lease, but only while
    /// `commit.token` still holds it.
    ///
    /// Returns `None` if the lease was lost.
    pub async fn update_locked(
        tx: &mut Transaction<'_, Postgres>,
        commit: &PageCommit,
    ) -> Result<Option<PageRow>, sqlx::Error> {
        let query = format!(
            "UPDATE pages SET \
                title = $3, content = $4, rendered_html = $5, plain_text = $6, \
                last_written = $7, lock_token = NULL, lock_expiry = NULL \
             WHERE id = $1 AND lock_token = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PageRow>(&query)
            .bind(commit.page_id)
            .bind(commit.token)
            .bind(&commit.title)
            .bind(&commit.content)
            .bind(&commit.rendered_html)
            .bind(&commit.plain_text)
            .bind(commit.written_at)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Set the lease only if the page has none. Returns whether this call won.
    pub async fn acquire_lock(
        pool: &PgPool,
        id: DbId,
        token: LockToken,
        expiry: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE pages SET lock_token = $2, lock_expiry = $3 \
             WHERE id = $1 AND lock_token IS NULL",
        )
        .bind(id)
        .bind(token)
        .bind(expiry)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Clear the lease if it expired at or before `now`.
    pub async fn clear_expired_lock(
        pool: &PgPool,
        id: DbId,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE pages SET lock_token = NULL, lock_expiry = NULL \
             WHERE id = $1 AND lock_expiry <= $2",
        )
        .bind(id)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Clear the lease if `token` holds it.
    pub async fn release_lock(pool: &PgPool, id: DbId, token: LockToken) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE pages SET lock_token = NULL, lock_expiry = NULL \
             WHERE id = $1 AND lock_token = $2",
        )
        .bind(id)
        .bind(token)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Clear all leases that expired at or before `now`. Returns how many.
    pub async fn cleanup_expired(pool: &PgPool, now: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE pages SET lock_token = NULL, lock_expiry = NULL \
             WHERE lock_expiry <= $1",
        )
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete a page; its history goes with it (`ON DELETE CASCADE`).
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pages WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM pages")
            .fetch_one(pool)
            .await
    }

    /// The page at `offset` in id order.
    pub async fn nth(pool: &PgPool, offset: i64) -> Result<Option<PageRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM pages ORDER BY id LIMIT 1 OFFSET $1");
        sqlx::query_as::<_, PageRow>(&query)
            .bind(offset)
            .fetch_optional(pool)
            .await
    }

    /// Case-insensitive substring search over title and plain text.
    pub async fn search(
        pool: &PgPool,
        needle: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PageRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM pages \
             WHERE title ILIKE $1 OR plain_text ILIKE $1 \
             ORDER BY title COLLATE \"C\" \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, PageRow>(&query)
            .bind(like_pattern(needle))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    pub async fn count_search(pool: &PgPool, needle: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM pages WHERE title ILIKE $1 OR plain_text ILIKE $1")
            .bind(like_pattern(needle))
            .fetch_one(pool)
            .await
    }
}

/// `%needle%` with LIKE wildcards in `needle` escaped.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}
