//! Route definitions for the wiki, registered under `/wiki`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::wiki;
use crate::state::AppState;

/// Wiki routes, registered as `/wiki`.
///
/// ```text
/// GET    /random                                 random_page
/// GET    /search?q=&page=                        search
/// GET    /pages/{title}                          view_page
/// PUT    /pages/{title}                          save_page
/// DELETE /pages/{title}                          delete_page
/// GET    /pages/{title}/edit                     edit_form
/// GET    /pages/{title}/history?page=            history
/// GET    /pages/{title}/history/{event}          back
/// GET    /pages/{title}/history/{event}/diff     diff
/// POST   /pages/{title}/history/{event}/rehash   rehash
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/random", get(wiki::random_page))
        .route("/search", get(wiki::search))
        .route(
            "/pages/{title}",
            get(wiki::view_page)
                .put(wiki::save_page)
                .delete(wiki::delete_page),
        )
        .route("/pages/{title}/edit", get(wiki::edit_form))
        .route("/pages/{title}/history", get(wiki::history))
        .route("/pages/{title}/history/{event}", get(wiki::back))
        .route("/pages/{title}/history/{event}/diff", get(wiki::diff))
        .route("/pages/{title}/history/{event}/rehash", post(wiki::rehash))
}
