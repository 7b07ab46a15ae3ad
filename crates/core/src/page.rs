//! Page and history domain types.

use serde::Serialize;

use crate::types::{DbId, LockToken, Timestamp};

/// Current materialized state of one wiki page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub id: DbId,
    pub title: String,
    pub content: String,
    pub rendered_html: String,
    pub plain_text: String,
    #[serde(skip_serializing)]
    pub lock_token: Option<LockToken>,
    pub lock_expiry: Option<Timestamp>,
    pub last_written: Timestamp,
}

impl Page {
    /// Whether someone holds an unexpired lease at `now`.
    pub fn is_locked(&self, now: Timestamp) -> bool {
        matches!((self.lock_token, self.lock_expiry), (Some(_), Some(expiry)) if expiry > now)
    }

    /// Whether a lease is recorded but has run out at `now`.
    pub fn lock_expired(&self, now: Timestamp) -> bool {
        matches!(self.lock_expiry, Some(expiry) if expiry <= now)
    }
}

/// One immutable committed change to a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub id: DbId,
    pub page_id: DbId,
    pub event: i32,
    pub summary: String,
    pub title_patch: String,
    pub content_patch: String,
    pub written_at: Timestamp,
}

/// A page about to be created (its event-1 entry travels alongside).
#[derive(Debug, Clone)]
pub struct NewPage {
    pub title: String,
    pub content: String,
    pub rendered_html: String,
    pub plain_text: String,
    pub written_at: Timestamp,
}

/// A history entry about to be appended; the store fills in `page_id` on
/// creation.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub event: i32,
    pub summary: String,
    pub title_patch: String,
    pub content_patch: String,
    pub written_at: Timestamp,
}

/// The new state of a locked page, committed together with its history
/// entry. `token` must still own the page's lease.
#[derive(Debug, Clone)]
pub struct PageCommit {
    pub page_id: DbId,
    pub token: LockToken,
    pub title: String,
    pub content: String,
    pub rendered_html: String,
    pub plain_text: String,
    pub written_at: Timestamp,
}

/// Title and content as they were right after `event` committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Revision {
    pub event: i32,
    pub title: String,
    pub content: String,
}
