//! Persistence contracts for pages and their history.
//!
//! The revision engine only ever talks to storage through these traits.
//! `conditional_acquire_lock` is the one primitive that must be indivisible
//! with respect to concurrent callers; everything else may be a plain read
//! or a single transaction.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::page::{HistoryEntry, NewHistoryEntry, NewPage, Page, PageCommit};
use crate::types::{DbId, LockToken, Timestamp};

/// Current-state rows, one per page, keyed by unique title.
#[async_trait]
pub trait PageStore: Send + Sync {
    async fn find_by_title(&self, title: &str) -> Result<Option<Page>, CoreError>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<Page>, CoreError>;

    /// The page titled `title` only if it currently carries exactly this
    /// lease. Used to confirm a lock acquisition.
    async fn find_locked(
        &self,
        title: &str,
        token: LockToken,
        expiry: Timestamp,
    ) -> Result<Option<Page>, CoreError>;

    /// Insert a page together with its first history entry.
    ///
    /// Fails with [`CoreError::DuplicateTitle`] if the title is taken.
    async fn create(&self, page: NewPage, first: NewHistoryEntry) -> Result<Page, CoreError>;

    /// Append `entry` and write the page's new state in one transaction,
    /// clearing the lease.
    ///
    /// Fails with [`CoreError::LockHeld`] if `commit.token` no longer owns the
    /// page, and with [`CoreError::DuplicateTitle`] if a rename collides.
    async fn commit(&self, commit: PageCommit, entry: NewHistoryEntry) -> Result<Page, CoreError>;

    /// Set the lease only if the page currently has none. Returns whether
    /// this call won.
    async fn conditional_acquire_lock(
        &self,
        page_id: DbId,
        token: LockToken,
        expiry: Timestamp,
    ) -> Result<bool, CoreError>;

    /// Clear the lease if it expired at or before `now`. Returns whether a
    /// lease was cleared.
    async fn clear_expired_lock(&self, page_id: DbId, now: Timestamp) -> Result<bool, CoreError>;

    /// Give up a lease without committing.
    async fn release_lock(&self, page_id: DbId, token: LockToken) -> Result<(), CoreError>;

    /// Clear every lease that expired at or before `now`. Returns how many.
    async fn clear_all_expired_locks(&self, now: Timestamp) -> Result<u64, CoreError>;

    /// Remove a page and all of its history. Returns whether it existed.
    async fn delete(&self, page_id: DbId) -> Result<bool, CoreError>;

    async fn count_pages(&self) -> Result<i64, CoreError>;

    /// The page at `offset` in id order.
    async fn nth(&self, offset: i64) -> Result<Option<Page>, CoreError>;

    /// Pages whose title or plain text contains `query`, ordered by title.
    async fn search(&self, query: &str, limit: i64, offset: i64) -> Result<Vec<Page>, CoreError>;

    async fn count_search(&self, query: &str) -> Result<i64, CoreError>;
}

/// The append-only per-page event log.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Highest event number for the page, 0 if it has none.
    async fn latest_event(&self, page_id: DbId) -> Result<i32, CoreError>;

    async fn find_entry(&self, page_id: DbId, event: i32) -> Result<Option<HistoryEntry>, CoreError>;

    /// Entries `1..=event` in ascending order.
    async fn entries_through(&self, page_id: DbId, event: i32) -> Result<Vec<HistoryEntry>, CoreError>;

    /// Entries newest first.
    async fn list(&self, page_id: DbId, limit: i64, offset: i64) -> Result<Vec<HistoryEntry>, CoreError>;

    async fn count_entries(&self, page_id: DbId) -> Result<i64, CoreError>;
}

/// A backend that stores both pages and history.
pub trait WikiStore: PageStore + HistoryStore {}

impl<T: PageStore + HistoryStore> WikiStore for T {}
