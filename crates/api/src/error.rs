use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use folio_core::error::CoreError;
use folio_core::service::{EditDraft, EditRejection};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `folio_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A rejected edit. The response carries the submitted draft back so
    /// the client can re-prompt without losing work.
    #[error("{error}")]
    EditRejected { error: CoreError, draft: EditDraft },

    /// Malformed path, query or body, as reported by the extractors in
    /// [`crate::extract`].
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<EditRejection> for AppError {
    fn from(rejection: EditRejection) -> Self {
        AppError::EditRejected {
            error: rejection.error,
            draft: rejection.draft,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) | AppError::EditRejected { error: core, .. } => {
                classify_core_error(core)
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = match &self {
            AppError::EditRejected { draft, .. } => json!({
                "error": message,
                "code": code,
                "draft": draft,
            }),
            _ => json!({
                "error": message,
                "code": code,
            }),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a domain error into an HTTP status, error code, and message.
///
/// - `NotFound` maps to 404, `Validation` to 400.
/// - Title collisions, held leases and write conflicts map to 409.
/// - A history that cannot be replayed maps to 500 `REVISION_UNAVAILABLE`.
/// - Everything else maps to 500 with a sanitized message.
fn classify_core_error(err: &CoreError) -> (StatusCode, &'static str, String) {
    match err {
        CoreError::NotFound { entity, key } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} '{key}' not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::DuplicateTitle(_) => (StatusCode::CONFLICT, "DUPLICATE_TITLE", err.to_string()),
        CoreError::LockHeld(_) => (StatusCode::CONFLICT, "PAGE_LOCKED", err.to_string()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::PatchApply(msg) => {
            tracing::error!(error = %msg, "Revision history could not be replayed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "REVISION_UNAVAILABLE",
                "This revision could not be reconstructed".to_string(),
            )
        }
        CoreError::Render(msg) | CoreError::Store(msg) | CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}
