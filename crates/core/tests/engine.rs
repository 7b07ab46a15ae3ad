//! End-to-end behaviour of the revision engine against the in-memory store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use folio_core::clock::ManualClock;
use folio_core::error::CoreError;
use folio_core::lock::LockManager;
use folio_core::memory_store::MemoryStore;
use folio_core::page::{HistoryEntry, NewHistoryEntry, NewPage, Page, PageCommit};
use folio_core::patch;
use folio_core::reconstruct::reconstruct;
use folio_core::render::{MarkupRenderer, RenderTransform, Rendered};
use folio_core::service::{EditDraft, WikiService};
use folio_core::store::{HistoryStore, PageStore, WikiStore};
use folio_core::types::{DbId, LockToken, Timestamp};
use folio_core::wiki::WikiConfig;

// =============================================================================
// Test helpers
// =============================================================================

/// Delegates to a [`MemoryStore`] but yields to the scheduler before every
/// call, so concurrent pipelines interleave at each store round trip.
#[derive(Default)]
struct YieldingStore {
    inner: MemoryStore,
    conflict_on_acquire: AtomicBool,
}

#[async_trait]
impl PageStore for YieldingStore {
    async fn find_by_title(&self, title: &str) -> Result<Option<Page>, CoreError> {
        tokio::task::yield_now().await;
        self.inner.find_by_title(title).await
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Page>, CoreError> {
        tokio::task::yield_now().await;
        self.inner.find_by_id(id).await
    }

    async fn find_locked(
        &self,
        title: &str,
        token: LockToken,
        expiry: Timestamp,
    ) -> Result<Option<Page>, CoreError> {
        tokio::task::yield_now().await;
        self.inner.find_locked(title, token, expiry).await
    }

    async fn create(&self, page: NewPage, first: NewHistoryEntry) -> Result<Page, CoreError> {
        tokio::task::yield_now().await;
        self.inner.create(page, first).await
    }

    async fn commit(&self, commit: PageCommit, entry: NewHistoryEntry) -> Result<Page, CoreError> {
        tokio::task::yield_now().await;
        self.inner.commit(commit, entry).await
    }

    async fn conditional_acquire_lock(
        &self,
        page_id: DbId,
        token: LockToken,
        expiry: Timestamp,
    ) -> Result<bool, CoreError> {
        tokio::task::yield_now().await;
        if self.conflict_on_acquire.load(Ordering::SeqCst) {
            return Err(CoreError::Conflict("could not serialize access".into()));
        }
        self.inner.conditional_acquire_lock(page_id, token, expiry).await
    }

    async fn clear_expired_lock(&self, page_id: DbId, now: Timestamp) -> Result<bool, CoreError> {
        tokio::task::yield_now().await;
        self.inner.clear_expired_lock(page_id, now).await
    }

    async fn release_lock(&self, page_id: DbId, token: LockToken) -> Result<(), CoreError> {
        tokio::task::yield_now().await;
        self.inner.release_lock(page_id, token).await
    }

    async fn clear_all_expired_locks(&self, now: Timestamp) -> Result<u64, CoreError> {
        self.inner.clear_all_expired_locks(now).await
    }

    async fn delete(&self, page_id: DbId) -> Result<bool, CoreError> {
        self.inner.delete(page_id).await
    }

    async fn count_pages(&self) -> Result<i64, CoreError> {
        self.inner.count_pages().await
    }

    async fn nth(&self, offset: i64) -> Result<Option<Page>, CoreError> {
        self.inner.nth(offset).await
    }

    async fn search(&self, query: &str, limit: i64, offset: i64) -> Result<Vec<Page>, CoreError> {
        self.inner.search(query, limit, offset).await
    }

    async fn count_search(&self, query: &str) -> Result<i64, CoreError> {
        self.inner.count_search(query).await
    }
}

#[async_trait]
impl HistoryStore for YieldingStore {
    async fn latest_event(&self, page_id: DbId) -> Result<i32, CoreError> {
        tokio::task::yield_now().await;
        self.inner.latest_event(page_id).await
    }

    async fn find_entry(&self, page_id: DbId, event: i32) -> Result<Option<HistoryEntry>, CoreError> {
        self.inner.find_entry(page_id, event).await
    }

    async fn entries_through(&self, page_id: DbId, event: i32) -> Result<Vec<HistoryEntry>, CoreError> {
        self.inner.entries_through(page_id, event).await
    }

    async fn list(&self, page_id: DbId, limit: i64, offset: i64) -> Result<Vec<HistoryEntry>, CoreError> {
        self.inner.list(page_id, limit, offset).await
    }

    async fn count_entries(&self, page_id: DbId) -> Result<i64, CoreError> {
        self.inner.count_entries(page_id).await
    }
}

/// Renders normally unless the content contains `boom`.
struct FragileRenderer;

impl RenderTransform for FragileRenderer {
    fn render(&self, content: &str) -> Result<Rendered, CoreError> {
        if content.contains("boom") {
            return Err(CoreError::Render("renderer exploded".into()));
        }
        MarkupRenderer.render(content)
    }
}

struct Harness {
    store: Arc<YieldingStore>,
    clock: Arc<ManualClock>,
    wiki: WikiService,
}

impl Harness {
    fn new() -> Self {
        Self::with_renderer(Arc::new(MarkupRenderer))
    }

    fn with_renderer(renderer: Arc<dyn RenderTransform>) -> Self {
        let store = Arc::new(YieldingStore::default());
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let wiki = WikiService::new(store.clone(), clock.clone(), renderer, WikiConfig::default());
        Self { store, clock, wiki }
    }

    fn locks(&self) -> LockManager {
        LockManager::new(self.store.clone(), self.clock.clone(), Duration::seconds(60))
    }

    async fn write(&self, title: &str, new_title: &str, content: &str, summary: &str) -> Page {
        self.wiki
            .submit_edit(title, draft(new_title, content, summary))
            .await
            .unwrap_or_else(|r| panic!("edit of {title} rejected: {}", r.error))
            .page
    }

    async fn page(&self, title: &str) -> Page {
        self.store.find_by_title(title).await.unwrap().unwrap()
    }

    async fn entries(&self, page_id: DbId) -> Vec<HistoryEntry> {
        self.store.entries_through(page_id, i32::MAX).await.unwrap()
    }
}

fn draft(new_title: &str, content: &str, summary: &str) -> EditDraft {
    EditDraft {
        new_title: new_title.into(),
        content: content.into(),
        summary: summary.into(),
    }
}

fn store_of(h: &Harness) -> &dyn WikiStore {
    h.store.as_ref()
}

// =============================================================================
// Create / edit / reconstruct
// =============================================================================

#[tokio::test]
async fn home_create_then_edit_reconstructs_both_events() {
    let h = Harness::new();
    let created = h.write("Home", "Home", "Hi", "").await;
    let entries = h.entries(created.id).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event, 1);
    assert_eq!(entries[0].summary, "create");

    h.write("Home", "Home", "Hi there", "update").await;
    let entries = h.entries(created.id).await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].event, 2);
    assert_eq!(entries[1].summary, "update");

    let first = reconstruct(store_of(&h), "Home", 1).await.unwrap().unwrap();
    assert_eq!((first.title.as_str(), first.content.as_str()), ("Home", "Hi"));
    let second = reconstruct(store_of(&h), "Home", 2).await.unwrap().unwrap();
    assert_eq!((second.title.as_str(), second.content.as_str()), ("Home", "Hi there"));
}

#[tokio::test]
async fn reconstruct_missing_page_or_event_is_none() {
    let h = Harness::new();
    h.write("Home", "Home", "Hi", "").await;
    assert!(reconstruct(store_of(&h), "Nowhere", 1).await.unwrap().is_none());
    assert!(reconstruct(store_of(&h), "Home", 0).await.unwrap().is_none());
    assert!(reconstruct(store_of(&h), "Home", 2).await.unwrap().is_none());
}

#[tokio::test]
async fn latest_reconstruction_matches_current_and_replays_compose() {
    let h = Harness::new();
    h.write("Draft", "Draft", "one", "").await;
    h.write("Draft", "Draft", "one\n\ntwo", "").await;
    h.write("Draft", "Notes", "one\n\ntwo, three", "rename").await;
    h.write("Notes", "Notes", "zero\n\ntwo, three ☕", "").await;

    let current = h.page("Notes").await;
    let entries = h.entries(current.id).await;
    let latest = entries.len() as i32;
    assert_eq!(latest, 4);

    let rebuilt = reconstruct(store_of(&h), "Notes", latest).await.unwrap().unwrap();
    assert_eq!(rebuilt.title, current.title);
    assert_eq!(rebuilt.content, current.content);

    for k in 1..latest {
        let base = reconstruct(store_of(&h), "Notes", k).await.unwrap().unwrap();
        let (mut title, mut content) = (base.title, base.content);
        for entry in &entries[k as usize..] {
            title = patch::apply_encoded(&title, &entry.title_patch).unwrap();
            content = patch::apply_encoded(&content, &entry.content_patch).unwrap();
        }
        assert_eq!((title.as_str(), content.as_str()), (current.title.as_str(), current.content.as_str()));
    }
}

#[tokio::test]
async fn corrupt_history_surfaces_patch_error() {
    let store = MemoryStore::new();
    let now = Utc::now();
    let page = store
        .create(
            NewPage {
                title: "Home".into(),
                content: "Bye".into(),
                rendered_html: String::new(),
                plain_text: String::new(),
                written_at: now,
            },
            NewHistoryEntry {
                event: 1,
                summary: "create".into(),
                title_patch: patch::diff("", "Home").encode(),
                content_patch: patch::diff("", "Bye").encode(),
                written_at: now,
            },
        )
        .await
        .unwrap();

    // Event 2 was computed against a base the chain never produced.
    let token = uuid::Uuid::new_v4();
    store
        .conditional_acquire_lock(page.id, token, now + Duration::seconds(60))
        .await
        .unwrap();
    store
        .commit(
            PageCommit {
                page_id: page.id,
                token,
                title: "Home".into(),
                content: "Hi there".into(),
                rendered_html: String::new(),
                plain_text: String::new(),
                written_at: now,
            },
            NewHistoryEntry {
                event: 2,
                summary: "edit".into(),
                title_patch: String::new(),
                content_patch: patch::diff("Hi", "Hi there").encode(),
                written_at: now,
            },
        )
        .await
        .unwrap();

    assert!(reconstruct(&store, "Home", 1).await.unwrap().is_some());
    assert_matches!(
        reconstruct(&store, "Home", 2).await,
        Err(CoreError::PatchApply(_))
    );
}

// =============================================================================
// Locking
// =============================================================================

#[tokio::test]
async fn held_lease_rejects_edit_and_preserves_draft() {
    let h = Harness::new();
    h.write("Home", "Home", "Hi", "").await;
    let _lease = h.locks().acquire("Home").await.unwrap();

    let submitted = draft("Home", "Hi from the loser", "mine");
    let rejection = h
        .wiki
        .submit_edit("Home", submitted.clone())
        .await
        .unwrap_err();
    assert_matches!(rejection.error, CoreError::LockHeld(_));
    assert!(rejection.error.is_recoverable());
    assert_eq!(rejection.draft, submitted);

    let page = h.page("Home").await;
    assert_eq!(page.content, "Hi");
    assert_eq!(h.entries(page.id).await.len(), 1);
}

#[tokio::test]
async fn lease_expires_after_sixty_seconds() {
    let h = Harness::new();
    h.write("Home", "Home", "Hi", "").await;
    let _abandoned = h.locks().acquire("Home").await.unwrap();

    h.clock.advance(Duration::seconds(59));
    assert!(h.wiki.submit_edit("Home", draft("Home", "early", "")).await.is_err());

    h.clock.advance(Duration::seconds(2));
    let page = h.write("Home", "Home", "late", "").await;
    assert_eq!(page.content, "late");
    assert_eq!(page.lock_token, None);
    assert_eq!(h.entries(page.id).await.len(), 2);
}

#[tokio::test]
async fn concurrent_edits_exactly_one_wins() {
    let h = Harness::new();
    h.write("Home", "Home", "Hi", "").await;

    let (a, b) = tokio::join!(
        h.wiki.submit_edit("Home", draft("Home", "Hi from A", "")),
        h.wiki.submit_edit("Home", draft("Home", "Hi from B", "")),
    );

    let (winner, loser) = match (a, b) {
        (Ok(saved), Err(rejection)) | (Err(rejection), Ok(saved)) => (saved.page, rejection),
        (a, b) => panic!("expected exactly one winner, got {:?} / {:?}", a.is_ok(), b.is_ok()),
    };
    assert_matches!(loser.error, CoreError::LockHeld(_));

    let page = h.page("Home").await;
    assert_eq!(page.content, winner.content);
    assert_ne!(page.content, loser.draft.content);
    let entries = h.entries(page.id).await;
    assert_eq!(entries.iter().map(|e| e.event).collect::<Vec<_>>(), vec![1, 2]);
}

#[tokio::test]
async fn submit_edit_reports_the_create_path() {
    let h = Harness::new();
    let first = h.wiki.submit_edit("Home", draft("Home", "Hi", "")).await.unwrap();
    assert!(first.created);
    let second = h.wiki.submit_edit("Home", draft("Home", "Hi there", "")).await.unwrap();
    assert!(!second.created);
    assert_eq!(second.page.id, first.page.id);
}

#[tokio::test]
async fn concurrent_creates_have_one_creator() {
    let h = Harness::new();

    let (a, b) = tokio::join!(
        h.wiki.submit_edit("Fresh", draft("Fresh", "from A", "")),
        h.wiki.submit_edit("Fresh", draft("Fresh", "from B", "")),
    );

    let (saved, loser) = match (a, b) {
        (Ok(saved), Err(rejection)) | (Err(rejection), Ok(saved)) => (saved, rejection),
        (a, b) => panic!("expected exactly one creator, got {:?} / {:?}", a.is_ok(), b.is_ok()),
    };
    assert!(saved.created);
    assert_matches!(loser.error, CoreError::DuplicateTitle(ref t) if t == "Fresh");
    assert_eq!(h.entries(saved.page.id).await.len(), 1);
}

#[tokio::test]
async fn store_conflict_during_acquire_is_a_lost_race() {
    let h = Harness::new();
    h.write("Home", "Home", "Hi", "").await;
    h.store.conflict_on_acquire.store(true, Ordering::SeqCst);

    let rejection = h
        .wiki
        .submit_edit("Home", draft("Home", "Hi again", ""))
        .await
        .unwrap_err();
    assert_matches!(rejection.error, CoreError::LockHeld(_));

    h.store.conflict_on_acquire.store(false, Ordering::SeqCst);
    h.write("Home", "Home", "Hi again", "").await;
}

#[tokio::test]
async fn render_failure_writes_nothing() {
    let h = Harness::with_renderer(Arc::new(FragileRenderer));
    assert_matches!(
        h.wiki.submit_edit("Home", draft("Home", "boom", "")).await,
        Err(r) if matches!(r.error, CoreError::Render(_))
    );
    assert!(h.store.find_by_title("Home").await.unwrap().is_none());

    let page = h.write("Home", "Home", "Hi", "").await;
    assert_matches!(
        h.wiki.submit_edit("Home", draft("Home", "boom", "")).await,
        Err(r) if matches!(r.error, CoreError::Render(_))
    );
    let after = h.page("Home").await;
    assert_eq!(after.content, "Hi");
    assert_eq!(after.lock_token, None);
    assert_eq!(h.entries(page.id).await.len(), 1);
}

// =============================================================================
// Rename / rehash
// =============================================================================

#[tokio::test]
async fn rename_onto_existing_title_changes_nothing() {
    let h = Harness::new();
    let a = h.write("Alpha", "Alpha", "first", "").await;
    let b = h.write("Beta", "Beta", "second", "").await;

    let rejection = h
        .wiki
        .submit_edit("Alpha", draft("Beta", "first, renamed", ""))
        .await
        .unwrap_err();
    assert_matches!(rejection.error, CoreError::DuplicateTitle(ref t) if t == "Beta");

    assert_eq!(h.page("Alpha").await, a);
    assert_eq!(h.page("Beta").await, b);
    assert_eq!(h.entries(a.id).await.len(), 1);
    assert_eq!(h.entries(b.id).await.len(), 1);
}

#[tokio::test]
async fn rehash_commits_old_content_as_new_event() {
    let h = Harness::new();
    h.write("Home", "Home", "Hi", "").await;
    h.write("Home", "Home", "Hi there", "").await;
    h.write("Home", "Home", "Hi there, friend", "").await;

    let page = h.wiki.rehash("Home", 1).await.unwrap();
    assert_eq!(page.content, "Hi");

    let entries = h.entries(page.id).await;
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[3].event, 4);
    assert_eq!(entries[3].summary, "rehash(1)");
    let rebuilt = reconstruct(store_of(&h), "Home", 4).await.unwrap().unwrap();
    assert_eq!(rebuilt.content, "Hi");
}

#[tokio::test]
async fn rehash_restores_old_title() {
    let h = Harness::new();
    h.write("Home", "Home", "Hi", "").await;
    h.write("Home", "Start", "Hi", "").await;

    let page = h.wiki.rehash("Start", 1).await.unwrap();
    assert_eq!(page.title, "Home");
    assert!(h.store.find_by_title("Start").await.unwrap().is_none());
}

#[tokio::test]
async fn rehash_is_blocked_by_a_held_lease() {
    let h = Harness::new();
    h.write("Home", "Home", "Hi", "").await;
    h.write("Home", "Home", "Hi there", "").await;
    let _lease = h.locks().acquire("Home").await.unwrap();
    assert_matches!(h.wiki.rehash("Home", 1).await, Err(CoreError::LockHeld(_)));
}

// =============================================================================
// Presentation facade
// =============================================================================

#[tokio::test]
async fn view_distinguishes_missing_from_invalid() {
    let h = Harness::new();
    assert_matches!(h.wiki.view("Nowhere").await, Err(CoreError::NotFound { .. }));
    assert_matches!(h.wiki.view("bad/title").await, Err(CoreError::Validation(_)));
}

#[tokio::test]
async fn history_is_paged_newest_first() {
    let h = Harness::new();
    h.write("Log", "Log", "0", "").await;
    for i in 1..=12 {
        h.write("Log", "Log", &i.to_string(), "").await;
    }

    let first = h.wiki.history("Log", 1).await.unwrap();
    assert_eq!(first.last, 2);
    assert_eq!(first.current, 1);
    assert_eq!(first.entries.len(), 10);
    assert_eq!(first.entries[0].event, 13);

    let clamped = h.wiki.history("Log", 99).await.unwrap();
    assert_eq!(clamped.current, 2);
    assert_eq!(clamped.entries.len(), 3);
    assert_eq!(clamped.entries.last().map(|e| e.event), Some(1));

    assert_eq!(h.wiki.history("Log", -3).await.unwrap().current, 1);
}

#[tokio::test]
async fn diff_and_back_describe_a_past_event() {
    let h = Harness::new();
    h.write("Home", "Home", "Hi", "").await;
    h.write("Home", "Home", "Hi **there**", "greet").await;

    let diff = h.wiki.diff("Home", 2).await.unwrap();
    assert_eq!(diff.summary, "greet");
    assert!(diff.title_diff.is_empty());
    assert_eq!(diff.content_diff.len(), 1);

    let back = h.wiki.back("Home", 2).await.unwrap();
    assert_eq!(back.content, "Hi **there**");
    assert_eq!(back.html, "<p>Hi <strong>there</strong></p>");

    assert_matches!(h.wiki.diff("Home", 3).await, Err(CoreError::NotFound { .. }));
    assert_matches!(h.wiki.back("Home", 3).await, Err(CoreError::NotFound { .. }));
}

#[tokio::test]
async fn edit_form_for_new_and_existing_pages() {
    let h = Harness::new();
    let blank = h.wiki.edit("Fresh").await.unwrap();
    assert!(!blank.exists);
    assert_eq!(blank.content, "");

    h.write("Fresh", "Fresh", "content", "").await;
    let form = h.wiki.edit("Fresh").await.unwrap();
    assert!(form.exists);
    assert_eq!(form.content, "content");
}

#[tokio::test]
async fn random_page_falls_back_to_home() {
    let h = Harness::new();
    assert_eq!(h.wiki.random_page().await.unwrap().title, "Home");

    h.write("Only", "Only", "x", "").await;
    for _ in 0..5 {
        assert_eq!(h.wiki.random_page().await.unwrap().title, "Only");
    }
}

#[tokio::test]
async fn search_matches_title_and_text() {
    let h = Harness::new();
    h.write("Rust", "Rust", "systems language", "").await;
    h.write("Ferris", "Ferris", "the **rust** crab", "").await;
    h.write("Go", "Go", "gopher", "").await;

    let found = h.wiki.search("rust", 1).await.unwrap();
    let titles: Vec<&str> = found.pages.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["Ferris", "Rust"]);
    assert_eq!(found.last, 1);

    let blank = h.wiki.search("   ", 4).await.unwrap();
    assert!(blank.pages.is_empty());
    assert_eq!(blank.current, 1);
}

#[tokio::test]
async fn delete_removes_page_and_history() {
    let h = Harness::new();
    let page = h.write("Temp", "Temp", "x", "").await;
    h.write("Temp", "Temp", "y", "").await;

    h.wiki.delete("Temp").await.unwrap();
    assert!(h.store.find_by_title("Temp").await.unwrap().is_none());
    assert!(h.entries(page.id).await.is_empty());
    assert_matches!(h.wiki.delete("Temp").await, Err(CoreError::NotFound { .. }));
}

#[tokio::test]
async fn sweep_clears_abandoned_leases() {
    let h = Harness::new();
    h.write("Home", "Home", "Hi", "").await;
    h.locks().acquire("Home").await.unwrap();

    assert_eq!(h.wiki.sweep_expired_locks().await.unwrap(), 0);
    h.clock.advance(Duration::seconds(61));
    assert_eq!(h.wiki.sweep_expired_locks().await.unwrap(), 1);
    assert_eq!(h.page("Home").await.lock_token, None);
}
