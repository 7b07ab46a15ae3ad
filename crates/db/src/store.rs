//! [`PgStore`]: the core store contracts on top of PostgreSQL.

use async_trait::async_trait;
use folio_core::error::CoreError;
use folio_core::page::{HistoryEntry, NewHistoryEntry, NewPage, Page, PageCommit};
use folio_core::store::{HistoryStore, PageStore};
use folio_core::types::{DbId, LockToken, Timestamp};

use crate::repositories::{HistoryRepo, PageRepo};
use crate::DbPool;

/// Unique constraint on `pages.title`.
const TITLE_CONSTRAINT: &str = "uq_pages_title";

/// Page and history storage backed by a connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// Map a sqlx error into the domain taxonomy.
///
/// - title unique violation (23505 on `uq_pages_title`) -> `DuplicateTitle`
/// - other unique violations, serialization failures (40001) and deadlocks
///   (40P01) -> `Conflict`
/// - everything else -> `Store`
fn classify(err: sqlx::Error, title: Option<&str>) -> CoreError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23505") if db_err.constraint() == Some(TITLE_CONSTRAINT) => {
                return CoreError::DuplicateTitle(title.unwrap_or_default().to_string());
            }
            Some("23505") | Some("40001") | Some("40P01") => {
                tracing::debug!(error = %db_err, "Write conflict");
                return CoreError::Conflict(db_err.message().to_string());
            }
            _ => {}
        }
    }
    tracing::error!(error = %err, "Database error");
    CoreError::Store(err.to_string())
}

fn db_err(err: sqlx::Error) -> CoreError {
    classify(err, None)
}

#[async_trait]
impl PageStore for PgStore {
    async fn find_by_title(&self, title: &str) -> Result<Option<Page>, CoreError> {
        let row = PageRepo::find_by_title(&self.pool, title)
            .await
            .map_err(db_err)?;
        Ok(row.map(Page::from))
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Page>, CoreError> {
        let row = PageRepo::find_by_id(&self.pool, id).await.map_err(db_err)?;
        Ok(row.map(Page::from))
    }

    async fn find_locked(
        &self,
        title: &str,
        token: LockToken,
        expiry: Timestamp,
    ) -> Result<Option<Page>, CoreError> {
        let row = PageRepo::find_locked(&self.pool, title, token, expiry)
            .await
            .map_err(db_err)?;
        Ok(row.map(Page::from))
    }

    async fn create(&self, page: NewPage, first: NewHistoryEntry) -> Result<Page, CoreError> {
        let classify_title = |e| classify(e, Some(&page.title));

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let row = PageRepo::insert(&mut tx, &page)
            .await
            .map_err(classify_title)?;
        HistoryRepo::insert(&mut tx, row.id, &first)
            .await
            .map_err(classify_title)?;
        tx.commit().await.map_err(classify_title)?;

        Ok(row.into())
    }

    async fn commit(&self, commit: PageCommit, entry: NewHistoryEntry) -> Result<Page, CoreError> {
        let classify_title = |e| classify(e, Some(&commit.title));

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let Some(row) = PageRepo::update_locked(&mut tx, &commit)
            .await
            .map_err(classify_title)?
        else {
            tx.rollback().await.map_err(db_err)?;
            let current = PageRepo::find_by_id(&self.pool, commit.page_id)
                .await
                .map_err(db_err)?;
            return match current {
                Some(page) => Err(CoreError::LockHeld(page.title)),
                None => Err(CoreError::NotFound {
                    entity: "Page",
                    key: commit.page_id.to_string(),
                }),
            };
        };
        HistoryRepo::insert(&mut tx, row.id, &entry)
            .await
            .map_err(classify_title)?;
        tx.commit().await.map_err(classify_title)?;

        Ok(row.into())
    }

    async fn conditional_acquire_lock(
        &self,
        page_id: DbId,
        token: LockToken,
        expiry: Timestamp,
    ) -> Result<bool, CoreError> {
        PageRepo::acquire_lock(&self.pool, page_id, token, expiry)
            .await
            .map_err(db_err)
    }

    async fn clear_expired_lock(&self, page_id: DbId, now: Timestamp) -> Result<bool, CoreError> {
        PageRepo::clear_expired_lock(&self.pool, page_id, now)
            .await
            .map_err(db_err)
    }

    async fn release_lock(&self, page_id: DbId, token: LockToken) -> Result<(), CoreError> {
        PageRepo::release_lock(&self.pool, page_id, token)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn clear_all_expired_locks(&self, now: Timestamp) -> Result<u64, CoreError> {
        PageRepo::cleanup_expired(&self.pool, now)
            .await
            .map_err(db_err)
    }

    async fn delete(&self, page_id: DbId) -> Result<bool, CoreError> {
        PageRepo::delete(&self.pool, page_id).await.map_err(db_err)
    }

    async fn count_pages(&self) -> Result<i64, CoreError> {
        PageRepo::count(&self.pool).await.map_err(db_err)
    }

    async fn nth(&self, offset: i64) -> Result<Option<Page>, CoreError> {
        let row = PageRepo::nth(&self.pool, offset).await.map_err(db_err)?;
        Ok(row.map(Page::from))
    }

    async fn search(&self, query: &str, limit: i64, offset: i64) -> Result<Vec<Page>, CoreError> {
        let rows = PageRepo::search(&self.pool, query, limit, offset)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(Page::from).collect())
    }

    async fn count_search(&self, query: &str) -> Result<i64, CoreError> {
        PageRepo::count_search(&self.pool, query)
            .await
            .map_err(db_err)
    }
}

#[async_trait]
impl HistoryStore for PgStore {
    async fn latest_event(&self, page_id: DbId) -> Result<i32, CoreError> {
        HistoryRepo::latest_event(&self.pool, page_id)
            .await
            .map_err(db_err)
    }

    async fn find_entry(&self, page_id: DbId, event: i32) -> Result<Option<HistoryEntry>, CoreError> {
        let row = HistoryRepo::find(&self.pool, page_id, event)
            .await
            .map_err(db_err)?;
        Ok(row.map(HistoryEntry::from))
    }

    async fn entries_through(&self, page_id: DbId, event: i32) -> Result<Vec<HistoryEntry>, CoreError> {
        let rows = HistoryRepo::list_through(&self.pool, page_id, event)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(HistoryEntry::from).collect())
    }

    async fn list(&self, page_id: DbId, limit: i64, offset: i64) -> Result<Vec<HistoryEntry>, CoreError> {
        let rows = HistoryRepo::list(&self.pool, page_id, limit, offset)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(HistoryEntry::from).collect())
    }

    async fn count_entries(&self, page_id: DbId) -> Result<i64, CoreError> {
        HistoryRepo::count(&self.pool, page_id)
            .await
            .map_err(db_err)
    }
}
