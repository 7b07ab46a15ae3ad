#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} '{key}'")]
    NotFound { entity: &'static str, key: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("A page titled '{0}' already exists")]
    DuplicateTitle(String),

    #[error("Page '{0}' is being edited by someone else")]
    LockHeld(String),

    #[error("Patch could not be applied: {0}")]
    PatchApply(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a missing page.
    pub fn page_not_found(title: &str) -> Self {
        Self::NotFound {
            entity: "Page",
            key: title.to_string(),
        }
    }

    /// Shorthand for a missing history event on a page.
    pub fn event_not_found(title: &str, event: i32) -> Self {
        Self::NotFound {
            entity: "Revision",
            key: format!("{title}#{event}"),
        }
    }

    /// Whether the caller can re-prompt and retry without anything having
    /// been written.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::DuplicateTitle(_) | Self::LockHeld(_)
        )
    }
}
