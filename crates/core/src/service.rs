//! The operations the presentation layer calls.
//!
//! `WikiService` owns no state of its own beyond handles: the store, the
//! clock, the renderer and the engine settings are all passed in.

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::CoreError;
use crate::page::{HistoryEntry, Page};
use crate::patch::{DiffHunk, Patch};
use crate::pipeline::{SavedPage, UpdatePipeline};
use crate::reconstruct::reconstruct;
use crate::render::RenderTransform;
use crate::store::WikiStore;
use crate::types::{DbId, Timestamp};
use crate::wiki::{self, WikiConfig};

// ---------------------------------------------------------------------------
// Projections
// ---------------------------------------------------------------------------

/// One page of a page's history, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub title: String,
    pub entries: Vec<HistoryEntry>,
    pub current: i64,
    pub last: i64,
}

/// What changed in a single event.
#[derive(Debug, Clone, Serialize)]
pub struct RevisionDiff {
    pub title: String,
    pub event: i32,
    pub summary: String,
    pub written_at: Timestamp,
    pub title_patch: String,
    pub content_patch: String,
    pub title_diff: Vec<DiffHunk>,
    pub content_diff: Vec<DiffHunk>,
}

/// A page as it was right after a past event.
#[derive(Debug, Clone, Serialize)]
pub struct RevisionView {
    pub event: i32,
    pub title: String,
    pub content: String,
    pub html: String,
}

/// Initial state of an edit form.
#[derive(Debug, Clone, Serialize)]
pub struct EditForm {
    pub title: String,
    pub new_title: String,
    pub content: String,
    pub exists: bool,
}

/// A submitted edit, returned verbatim if the write is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditDraft {
    pub new_title: String,
    pub content: String,
    #[serde(default)]
    pub summary: String,
}

/// A write that did not happen, with the caller's draft intact.
#[derive(Debug)]
pub struct EditRejection {
    pub error: CoreError,
    pub draft: EditDraft,
}

#[derive(Debug, Clone, Serialize)]
pub struct RandomPage {
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageSummary {
    pub id: DbId,
    pub title: String,
    pub last_written: Timestamp,
}

impl From<Page> for PageSummary {
    fn from(page: Page) -> Self {
        Self {
            id: page.id,
            title: page.title,
            last_written: page.last_written,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub query: String,
    pub current: i64,
    pub last: i64,
    pub pages: Vec<PageSummary>,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct WikiService {
    store: Arc<dyn WikiStore>,
    renderer: Arc<dyn RenderTransform>,
    pipeline: UpdatePipeline,
    config: WikiConfig,
}

impl WikiService {
    pub fn new(
        store: Arc<dyn WikiStore>,
        clock: Arc<dyn Clock>,
        renderer: Arc<dyn RenderTransform>,
        config: WikiConfig,
    ) -> Self {
        let pipeline = UpdatePipeline::new(store.clone(), clock, renderer.clone(), config.lease);
        Self {
            store,
            renderer,
            pipeline,
            config,
        }
    }

    pub fn config(&self) -> &WikiConfig {
        &self.config
    }

    async fn find_page(&self, title: &str) -> Result<Page, CoreError> {
        match self.store.find_by_title(title).await? {
            Some(page) => Ok(page),
            None => {
                wiki::validate_title(title)?;
                Err(CoreError::page_not_found(title))
            }
        }
    }

    /// Current state of a page.
    pub async fn view(&self, title: &str) -> Result<Page, CoreError> {
        self.find_page(title).await
    }

    /// A page's history, newest first, `page_size` entries per page.
    pub async fn history(&self, title: &str, page_number: i64) -> Result<HistoryPage, CoreError> {
        let page = self.find_page(title).await?;
        let total = self.store.count_entries(page.id).await?;
        let last = wiki::last_page(total, self.config.page_size);
        let current = wiki::clamp_page(page_number, last);

        let entries = self
            .store
            .list(
                page.id,
                self.config.page_size,
                wiki::page_offset(current, self.config.page_size),
            )
            .await?;

        Ok(HistoryPage {
            title: page.title,
            entries,
            current,
            last,
        })
    }

    /// The change recorded at `event`.
    pub async fn diff(&self, title: &str, event: i32) -> Result<RevisionDiff, CoreError> {
        let page = self.find_page(title).await?;
        let entry = self
            .store
            .find_entry(page.id, event)
            .await?
            .ok_or_else(|| CoreError::event_not_found(title, event))?;

        let title_diff = Patch::decode(&entry.title_patch)?.display();
        let content_diff = Patch::decode(&entry.content_patch)?.display();

        Ok(RevisionDiff {
            title: page.title,
            event: entry.event,
            summary: entry.summary,
            written_at: entry.written_at,
            title_patch: entry.title_patch,
            content_patch: entry.content_patch,
            title_diff,
            content_diff,
        })
    }

    /// The page as it was right after `event`.
    pub async fn back(&self, title: &str, event: i32) -> Result<RevisionView, CoreError> {
        let revision = reconstruct(self.store.as_ref(), title, event)
            .await?
            .ok_or_else(|| CoreError::event_not_found(title, event))?;
        let rendered = self.renderer.render(&revision.content)?;

        Ok(RevisionView {
            event: revision.event,
            title: revision.title,
            content: revision.content,
            html: rendered.html,
        })
    }

    /// Initial edit form for `title`; blank when the page does not exist.
    pub async fn edit(&self, title: &str) -> Result<EditForm, CoreError> {
        match self.store.find_by_title(title).await? {
            Some(page) => Ok(EditForm {
                title: page.title.clone(),
                new_title: page.title,
                content: page.content,
                exists: true,
            }),
            None => {
                wiki::validate_title(title)?;
                Ok(EditForm {
                    title: title.to_string(),
                    new_title: title.to_string(),
                    content: String::new(),
                    exists: false,
                })
            }
        }
    }

    /// Create or edit `title` from a submitted draft.
    pub async fn submit_edit(
        &self,
        title: &str,
        draft: EditDraft,
    ) -> Result<SavedPage, EditRejection> {
        let result = self
            .pipeline
            .create_or_update(title, &draft.new_title, &draft.content, &draft.summary)
            .await;

        result.map_err(|error| {
            tracing::debug!(title, error = %error, "Edit rejected");
            EditRejection { error, draft }
        })
    }

    /// Revert `title` to the state right after `event`, as a new edit.
    pub async fn rehash(&self, title: &str, event: i32) -> Result<Page, CoreError> {
        self.pipeline.revert(title, event).await
    }

    /// A uniformly random page title, or the home title when empty.
    pub async fn random_page(&self) -> Result<RandomPage, CoreError> {
        let count = self.store.count_pages().await?;
        if count == 0 {
            return Ok(RandomPage {
                title: self.config.home_title.clone(),
            });
        }

        let offset = rand::rng().random_range(0..count);
        let title = match self.store.nth(offset).await? {
            Some(page) => page.title,
            None => self.config.home_title.clone(),
        };
        Ok(RandomPage { title })
    }

    /// Pages whose title or text contains `query`.
    pub async fn search(&self, query: &str, page_number: i64) -> Result<SearchPage, CoreError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchPage {
                query: String::new(),
                current: 1,
                last: 1,
                pages: Vec::new(),
            });
        }

        let total = self.store.count_search(query).await?;
        let last = wiki::last_page(total, self.config.page_size);
        let current = wiki::clamp_page(page_number, last);
        let pages = self
            .store
            .search(
                query,
                self.config.page_size,
                wiki::page_offset(current, self.config.page_size),
            )
            .await?
            .into_iter()
            .map(PageSummary::from)
            .collect();

        Ok(SearchPage {
            query: query.to_string(),
            current,
            last,
            pages,
        })
    }

    /// Remove a page and all of its history.
    pub async fn delete(&self, title: &str) -> Result<(), CoreError> {
        let page = self.find_page(title).await?;
        self.store.delete(page.id).await?;
        tracing::info!(page_id = page.id, title, "Page deleted");
        Ok(())
    }

    /// Clear every expired lease.
    pub async fn sweep_expired_locks(&self) -> Result<u64, CoreError> {
        self.pipeline.locks().sweep().await
    }
}
