//! In-process implementation of the store contracts.
//!
//! A single mutex guards both pages and history, so every operation is
//! trivially atomic. Used by the test suites and by anything embedding the
//! engine without PostgreSQL.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::CoreError;
use crate::page::{HistoryEntry, NewHistoryEntry, NewPage, Page, PageCommit};
use crate::store::{HistoryStore, PageStore};
use crate::types::{DbId, LockToken, Timestamp};

#[derive(Debug, Default)]
struct Inner {
    pages: BTreeMap<DbId, Page>,
    history: Vec<HistoryEntry>,
    last_page_id: DbId,
    last_entry_id: DbId,
}

impl Inner {
    fn title_taken(&self, title: &str, except: Option<DbId>) -> bool {
        self.pages
            .values()
            .any(|p| p.title == title && Some(p.id) != except)
    }

    fn append(&mut self, page_id: DbId, entry: NewHistoryEntry) -> Result<(), CoreError> {
        if self
            .history
            .iter()
            .any(|h| h.page_id == page_id && h.event == entry.event)
        {
            return Err(CoreError::Conflict(format!(
                "event {} already recorded for page {page_id}",
                entry.event
            )));
        }
        self.last_entry_id += 1;
        self.history.push(HistoryEntry {
            id: self.last_entry_id,
            page_id,
            event: entry.event,
            summary: entry.summary,
            title_patch: entry.title_patch,
            content_patch: entry.content_patch,
            written_at: entry.written_at,
        });
        Ok(())
    }

    fn matching(&self, query: &str) -> Vec<&Page> {
        let needle = query.to_lowercase();
        let mut pages: Vec<&Page> = self
            .pages
            .values()
            .filter(|p| {
                p.title.to_lowercase().contains(&needle)
                    || p.plain_text.to_lowercase().contains(&needle)
            })
            .collect();
        pages.sort_by(|a, b| a.title.cmp(&b.title));
        pages
    }
}

/// Mutex-guarded page and history tables.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn to_usize(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

#[async_trait]
impl PageStore for MemoryStore {
    async fn find_by_title(&self, title: &str) -> Result<Option<Page>, CoreError> {
        Ok(self.lock().pages.values().find(|p| p.title == title).cloned())
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Page>, CoreError> {
        Ok(self.lock().pages.get(&id).cloned())
    }

    async fn find_locked(
        &self,
        title: &str,
        token: LockToken,
        expiry: Timestamp,
    ) -> Result<Option<Page>, CoreError> {
        Ok(self
            .lock()
            .pages
            .values()
            .find(|p| {
                p.title == title && p.lock_token == Some(token) && p.lock_expiry == Some(expiry)
            })
            .cloned())
    }

    async fn create(&self, page: NewPage, first: NewHistoryEntry) -> Result<Page, CoreError> {
        let mut inner = self.lock();
        if inner.title_taken(&page.title, None) {
            return Err(CoreError::DuplicateTitle(page.title));
        }

        let id = inner.last_page_id + 1;
        inner.append(id, first)?;
        inner.last_page_id = id;

        let created = Page {
            id,
            title: page.title,
            content: page.content,
            rendered_html: page.rendered_html,
            plain_text: page.plain_text,
            lock_token: None,
            lock_expiry: None,
            last_written: page.written_at,
        };
        inner.pages.insert(id, created.clone());
        Ok(created)
    }

    async fn commit(&self, commit: PageCommit, entry: NewHistoryEntry) -> Result<Page, CoreError> {
        let mut inner = self.lock();
        let current = inner
            .pages
            .get(&commit.page_id)
            .ok_or_else(|| CoreError::NotFound {
                entity: "Page",
                key: commit.page_id.to_string(),
            })?;

        if current.lock_token != Some(commit.token) {
            return Err(CoreError::LockHeld(current.title.clone()));
        }
        if inner.title_taken(&commit.title, Some(commit.page_id)) {
            return Err(CoreError::DuplicateTitle(commit.title));
        }

        inner.append(commit.page_id, entry)?;

        let page = inner
            .pages
            .get_mut(&commit.page_id)
            .ok_or_else(|| CoreError::Internal("page vanished during commit".into()))?;
        page.title = commit.title;
        page.content = commit.content;
        page.rendered_html = commit.rendered_html;
        page.plain_text = commit.plain_text;
        page.lock_token = None;
        page.lock_expiry = None;
        page.last_written = commit.written_at;
        Ok(page.clone())
    }

    async fn conditional_acquire_lock(
        &self,
        page_id: DbId,
        token: LockToken,
        expiry: Timestamp,
    ) -> Result<bool, CoreError> {
        let mut inner = self.lock();
        match inner.pages.get_mut(&page_id) {
            Some(page) if page.lock_token.is_none() => {
                page.lock_token = Some(token);
                page.lock_expiry = Some(expiry);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn clear_expired_lock(&self, page_id: DbId, now: Timestamp) -> Result<bool, CoreError> {
        let mut inner = self.lock();
        match inner.pages.get_mut(&page_id) {
            Some(page) if page.lock_expired(now) => {
                page.lock_token = None;
                page.lock_expiry = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_lock(&self, page_id: DbId, token: LockToken) -> Result<(), CoreError> {
        let mut inner = self.lock();
        if let Some(page) = inner.pages.get_mut(&page_id) {
            if page.lock_token == Some(token) {
                page.lock_token = None;
                page.lock_expiry = None;
            }
        }
        Ok(())
    }

    async fn clear_all_expired_locks(&self, now: Timestamp) -> Result<u64, CoreError> {
        let mut inner = self.lock();
        let mut cleared = 0;
        for page in inner.pages.values_mut() {
            if page.lock_expired(now) {
                page.lock_token = None;
                page.lock_expiry = None;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn delete(&self, page_id: DbId) -> Result<bool, CoreError> {
        let mut inner = self.lock();
        let existed = inner.pages.remove(&page_id).is_some();
        inner.history.retain(|h| h.page_id != page_id);
        Ok(existed)
    }

    async fn count_pages(&self) -> Result<i64, CoreError> {
        Ok(self.lock().pages.len() as i64)
    }

    async fn nth(&self, offset: i64) -> Result<Option<Page>, CoreError> {
        Ok(self.lock().pages.values().nth(to_usize(offset)).cloned())
    }

    async fn search(&self, query: &str, limit: i64, offset: i64) -> Result<Vec<Page>, CoreError> {
        let inner = self.lock();
        Ok(inner
            .matching(query)
            .into_iter()
            .skip(to_usize(offset))
            .take(to_usize(limit))
            .cloned()
            .collect())
    }

    async fn count_search(&self, query: &str) -> Result<i64, CoreError> {
        Ok(self.lock().matching(query).len() as i64)
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn latest_event(&self, page_id: DbId) -> Result<i32, CoreError> {
        Ok(self
            .lock()
            .history
            .iter()
            .filter(|h| h.page_id == page_id)
            .map(|h| h.event)
            .max()
            .unwrap_or(0))
    }

    async fn find_entry(&self, page_id: DbId, event: i32) -> Result<Option<HistoryEntry>, CoreError> {
        Ok(self
            .lock()
            .history
            .iter()
            .find(|h| h.page_id == page_id && h.event == event)
            .cloned())
    }

    async fn entries_through(&self, page_id: DbId, event: i32) -> Result<Vec<HistoryEntry>, CoreError> {
        let mut entries: Vec<HistoryEntry> = self
            .lock()
            .history
            .iter()
            .filter(|h| h.page_id == page_id && h.event <= event)
            .cloned()
            .collect();
        entries.sort_by_key(|h| h.event);
        Ok(entries)
    }

    async fn list(&self, page_id: DbId, limit: i64, offset: i64) -> Result<Vec<HistoryEntry>, CoreError> {
        let mut entries: Vec<HistoryEntry> = self
            .lock()
            .history
            .iter()
            .filter(|h| h.page_id == page_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.event.cmp(&a.event));
        Ok(entries
            .into_iter()
            .skip(to_usize(offset))
            .take(to_usize(limit))
            .collect())
    }

    async fn count_entries(&self, page_id: DbId) -> Result<i64, CoreError> {
        Ok(self
            .lock()
            .history
            .iter()
            .filter(|h| h.page_id == page_id)
            .count() as i64)
    }
}
