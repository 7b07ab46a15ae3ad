//! Lease-based optimistic page locks.
//!
//! A page moves `UNLOCKED -> LOCKED(token, expiry) -> UNLOCKED`. Acquisition
//! is one bounded attempt: reclaim an expired lease, try the store's
//! conditional write, then confirm by reading the page back filtered on the
//! lease just written. Losing at any step is [`CoreError::LockHeld`]; there
//! is no waiting and no retry.

use std::sync::Arc;

use chrono::{Duration, SubsecRound};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::CoreError;
use crate::page::Page;
use crate::store::WikiStore;
use crate::types::{LockToken, Timestamp};

/// Store timestamps keep microseconds; leases are truncated to match so the
/// confirmatory read compares equal.
const EXPIRY_PRECISION: u16 = 6;

/// A held lease on a page.
#[derive(Debug, Clone)]
pub struct Lease {
    /// The page as read back while holding the lease.
    pub page: Page,
    pub token: LockToken,
    pub expiry: Timestamp,
}

/// Acquires and releases page leases against a store.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn WikiStore>,
    clock: Arc<dyn Clock>,
    lease: Duration,
}

impl LockManager {
    pub fn new(store: Arc<dyn WikiStore>, clock: Arc<dyn Clock>, lease: Duration) -> Self {
        Self {
            store,
            clock,
            lease,
        }
    }

    pub fn lease_duration(&self) -> Duration {
        self.lease
    }

    /// Try once to take the lease on `title`.
    pub async fn acquire(&self, title: &str) -> Result<Lease, CoreError> {
        let page = self
            .store
            .find_by_title(title)
            .await?
            .ok_or_else(|| CoreError::page_not_found(title))?;

        let now = self.clock.now();
        if page.lock_expired(now) && self.store.clear_expired_lock(page.id, now).await? {
            tracing::debug!(page_id = page.id, title, "Reclaimed expired lease");
        }

        let token = Uuid::new_v4();
        let expiry = (now + self.lease).trunc_subsecs(EXPIRY_PRECISION);

        let won = match self
            .store
            .conditional_acquire_lock(page.id, token, expiry)
            .await
        {
            Ok(won) => won,
            Err(CoreError::Conflict(reason)) => {
                tracing::debug!(page_id = page.id, title, %reason, "Write conflict while locking");
                false
            }
            Err(e) => return Err(e),
        };
        if !won {
            tracing::debug!(page_id = page.id, title, "Page already locked");
            return Err(CoreError::LockHeld(page.title));
        }

        match self.store.find_locked(&page.title, token, expiry).await? {
            Some(locked) => {
                tracing::debug!(page_id = locked.id, title, %token, "Lease acquired");
                Ok(Lease {
                    page: locked,
                    token,
                    expiry,
                })
            }
            None => {
                tracing::warn!(page_id = page.id, title, "Lease not confirmed after acquire");
                self.store.release_lock(page.id, token).await?;
                Err(CoreError::LockHeld(page.title))
            }
        }
    }

    /// Give up a lease without committing.
    pub async fn release(&self, lease: &Lease) -> Result<(), CoreError> {
        self.store.release_lock(lease.page.id, lease.token).await
    }

    /// Clear every expired lease. Returns how many were cleared.
    pub async fn sweep(&self) -> Result<u64, CoreError> {
        self.store.clear_all_expired_locks(self.clock.now()).await
    }
}
