pub mod health;
pub mod wiki;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /wiki     pages, history, search, random (see `wiki::router`)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/wiki", wiki::router())
}
