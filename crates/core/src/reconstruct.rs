//! Rebuild a page's title and content as of any past event.
//!
//! Replays the page's history from event 1, applying each title and content
//! patch to running accumulators that start empty. There are no snapshots;
//! cost grows with the target event number.

use crate::error::CoreError;
use crate::page::{HistoryEntry, Revision};
use crate::patch;
use crate::store::WikiStore;

/// Title and content right after `event` on the page titled `title`.
///
/// `Ok(None)` when the page or the event does not exist. A patch that fails
/// to apply is [`CoreError::PatchApply`]: the history is corrupt.
pub async fn reconstruct(
    store: &dyn WikiStore,
    title: &str,
    event: i32,
) -> Result<Option<Revision>, CoreError> {
    if event < 1 {
        return Ok(None);
    }
    let Some(page) = store.find_by_title(title).await? else {
        return Ok(None);
    };
    if store.find_entry(page.id, event).await?.is_none() {
        return Ok(None);
    }

    let entries = store.entries_through(page.id, event).await?;
    replay(&entries, event).map(Some).inspect_err(|e| {
        tracing::error!(page_id = page.id, title, event, error = %e, "History replay failed");
    })
}

/// Apply `entries` (ascending) up to and including `event`.
pub fn replay(entries: &[HistoryEntry], event: i32) -> Result<Revision, CoreError> {
    let mut title = String::new();
    let mut content = String::new();
    let mut expected = 1;

    for entry in entries {
        if entry.event > event {
            break;
        }
        if entry.event != expected {
            return Err(CoreError::PatchApply(format!(
                "history gap: expected event {expected}, found {}",
                entry.event
            )));
        }
        title = patch::apply_encoded(&title, &entry.title_patch)?;
        content = patch::apply_encoded(&content, &entry.content_patch)?;
        expected += 1;
    }

    Ok(Revision {
        event,
        title,
        content,
    })
}
