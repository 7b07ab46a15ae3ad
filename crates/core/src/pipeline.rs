//! The single write path for pages: create, edit, rename and revert.
//!
//! Order of work for every write:
//!
//! 1. validate the new title, content and summary,
//! 2. look up the page by its old title,
//! 3. on rename, refuse a title another page already owns,
//! 4. render the derived caches (before touching any lock),
//! 5. create the page with event 1, or take the lease, diff against the
//!    locked pre-edit state and commit event `latest + 1`.
//!
//! Every failure leaves the store unchanged. Nothing is retried here; the
//! caller decides whether to try again.

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::CoreError;
use crate::lock::{Lease, LockManager};
use crate::page::{NewHistoryEntry, NewPage, Page, PageCommit};
use crate::patch;
use crate::reconstruct::reconstruct;
use crate::render::{RenderTransform, Rendered};
use crate::store::WikiStore;
use crate::wiki::{self, SUMMARY_CREATE, SUMMARY_EDIT};

/// The outcome of a successful write.
#[derive(Debug, Clone)]
pub struct SavedPage {
    pub page: Page,
    /// `true` when this write created the page as event 1.
    pub created: bool,
}

/// Orchestrates validation, locking, diffing and the final commit.
#[derive(Clone)]
pub struct UpdatePipeline {
    store: Arc<dyn WikiStore>,
    clock: Arc<dyn Clock>,
    renderer: Arc<dyn RenderTransform>,
    locks: LockManager,
}

impl UpdatePipeline {
    pub fn new(
        store: Arc<dyn WikiStore>,
        clock: Arc<dyn Clock>,
        renderer: Arc<dyn RenderTransform>,
        lease: chrono::Duration,
    ) -> Self {
        let locks = LockManager::new(store.clone(), clock.clone(), lease);
        Self {
            store,
            clock,
            renderer,
            locks,
        }
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Write `new_title`/`content` to the page currently titled `old_title`,
    /// creating it if there is no such page.
    pub async fn create_or_update(
        &self,
        old_title: &str,
        new_title: &str,
        content: &str,
        summary: &str,
    ) -> Result<SavedPage, CoreError> {
        wiki::validate_title(new_title)?;
        wiki::validate_content(content)?;
        wiki::validate_summary(summary)?;

        let existing = self.store.find_by_title(old_title).await?;

        if old_title != new_title {
            if let Some(owner) = self.store.find_by_title(new_title).await? {
                if existing.as_ref().map(|p| p.id) != Some(owner.id) {
                    tracing::debug!(old_title, new_title, "Rename target already exists");
                    return Err(CoreError::DuplicateTitle(new_title.to_string()));
                }
            }
        }

        let rendered = self.renderer.render(content)?;

        match existing {
            None => {
                let page = self.create(new_title, content, summary, rendered).await?;
                Ok(SavedPage {
                    page,
                    created: true,
                })
            }
            Some(page) => {
                let lease = self.locks.acquire(&page.title).await?;
                match self.commit_edit(&lease, new_title, content, summary, rendered).await {
                    Ok(page) => Ok(SavedPage {
                        page,
                        created: false,
                    }),
                    Err(e) => {
                        if let Err(release_err) = self.locks.release(&lease).await {
                            tracing::warn!(
                                page_id = lease.page.id,
                                error = %release_err,
                                "Failed to release lease after aborted edit",
                            );
                        }
                        Err(e)
                    }
                }
            }
        }
    }

    /// Commit the content of a past event as a new edit of the page.
    pub async fn revert(&self, title: &str, event: i32) -> Result<Page, CoreError> {
        let revision = reconstruct(self.store.as_ref(), title, event)
            .await?
            .ok_or_else(|| CoreError::event_not_found(title, event))?;

        self.create_or_update(
            title,
            &revision.title,
            &revision.content,
            &wiki::rehash_summary(event),
        )
        .await
        .map(|saved| saved.page)
    }

    async fn create(
        &self,
        title: &str,
        content: &str,
        summary: &str,
        rendered: Rendered,
    ) -> Result<Page, CoreError> {
        let now = self.clock.now();
        let first = NewHistoryEntry {
            event: 1,
            summary: wiki::summary_or(summary, SUMMARY_CREATE),
            title_patch: patch::diff("", title).encode(),
            content_patch: patch::diff("", content).encode(),
            written_at: now,
        };
        let page = self
            .store
            .create(
                NewPage {
                    title: title.to_string(),
                    content: content.to_string(),
                    rendered_html: rendered.html,
                    plain_text: rendered.text,
                    written_at: now,
                },
                first,
            )
            .await?;

        tracing::info!(page_id = page.id, title, "Page created");
        Ok(page)
    }

    async fn commit_edit(
        &self,
        lease: &Lease,
        new_title: &str,
        content: &str,
        summary: &str,
        rendered: Rendered,
    ) -> Result<Page, CoreError> {
        let before = &lease.page;
        let event = self.store.latest_event(before.id).await? + 1;
        let now = self.clock.now();
        let summary = wiki::summary_or(summary, SUMMARY_EDIT);

        let entry = NewHistoryEntry {
            event,
            summary: summary.clone(),
            title_patch: patch::diff(&before.title, new_title).encode(),
            content_patch: patch::diff(&before.content, content).encode(),
            written_at: now,
        };
        let commit = PageCommit {
            page_id: before.id,
            token: lease.token,
            title: new_title.to_string(),
            content: content.to_string(),
            rendered_html: rendered.html,
            plain_text: rendered.text,
            written_at: now,
        };

        let page = self.store.commit(commit, entry).await?;
        tracing::info!(page_id = page.id, event, title = %page.title, %summary, "Page edited");
        Ok(page)
    }
}
