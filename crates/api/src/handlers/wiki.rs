//! Handlers for the wiki: page view, edit, history, diff, back, rehash,
//! search and random.
//!
//! Titles arrive percent-decoded in the path; the engine validates them.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use folio_core::service::EditDraft;

use crate::error::AppResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::response::DataResponse;
use crate::state::AppState;

/* --------------------------------------------------------------------------
Query param types
-------------------------------------------------------------------------- */

#[derive(Debug, serde::Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
}

#[derive(Debug, serde::Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub page: Option<i64>,
}

/* --------------------------------------------------------------------------
Pages
-------------------------------------------------------------------------- */

/// GET /wiki/pages/{title}
pub async fn view_page(
    State(state): State<AppState>,
    ApiPath(title): ApiPath<String>,
) -> AppResult<impl IntoResponse> {
    let page = state.wiki.view(&title).await?;
    Ok(Json(DataResponse { data: page }))
}

/// GET /wiki/pages/{title}/edit
///
/// Initial edit form; blank content when the page does not exist yet.
pub async fn edit_form(
    State(state): State<AppState>,
    ApiPath(title): ApiPath<String>,
) -> AppResult<impl IntoResponse> {
    let form = state.wiki.edit(&title).await?;
    Ok(Json(DataResponse { data: form }))
}

/// PUT /wiki/pages/{title}
///
/// Create or edit a page. Responds 201 when the page was created, 200 when
/// an existing page was edited. A rejected write echoes the draft back.
pub async fn save_page(
    State(state): State<AppState>,
    ApiPath(title): ApiPath<String>,
    ApiJson(draft): ApiJson<EditDraft>,
) -> AppResult<impl IntoResponse> {
    let saved = state.wiki.submit_edit(&title, draft).await?;
    let page = saved.page;

    tracing::info!(page_id = page.id, title = %page.title, created = saved.created, "Page saved");

    let status = if saved.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(DataResponse { data: page })))
}

/// DELETE /wiki/pages/{title}
pub async fn delete_page(
    State(state): State<AppState>,
    ApiPath(title): ApiPath<String>,
) -> AppResult<impl IntoResponse> {
    state.wiki.delete(&title).await?;
    Ok(StatusCode::NO_CONTENT)
}

/* --------------------------------------------------------------------------
History
-------------------------------------------------------------------------- */

/// GET /wiki/pages/{title}/history?page=
pub async fn history(
    State(state): State<AppState>,
    ApiPath(title): ApiPath<String>,
    ApiQuery(params): ApiQuery<PageParams>,
) -> AppResult<impl IntoResponse> {
    let page = state
        .wiki
        .history(&title, params.page.unwrap_or(1))
        .await?;
    Ok(Json(DataResponse { data: page }))
}

/// GET /wiki/pages/{title}/history/{event}
///
/// The page as it was right after `event`.
pub async fn back(
    State(state): State<AppState>,
    ApiPath((title, event)): ApiPath<(String, i32)>,
) -> AppResult<impl IntoResponse> {
    let revision = state.wiki.back(&title, event).await?;
    Ok(Json(DataResponse { data: revision }))
}

/// GET /wiki/pages/{title}/history/{event}/diff
pub async fn diff(
    State(state): State<AppState>,
    ApiPath((title, event)): ApiPath<(String, i32)>,
) -> AppResult<impl IntoResponse> {
    let diff = state.wiki.diff(&title, event).await?;
    Ok(Json(DataResponse { data: diff }))
}

/// POST /wiki/pages/{title}/history/{event}/rehash
///
/// Revert the page to `event` by writing a new event.
pub async fn rehash(
    State(state): State<AppState>,
    ApiPath((title, event)): ApiPath<(String, i32)>,
) -> AppResult<impl IntoResponse> {
    let page = state.wiki.rehash(&title, event).await?;
    tracing::info!(page_id = page.id, title = %page.title, event, "Page reverted");
    Ok(Json(DataResponse { data: page }))
}

/* --------------------------------------------------------------------------
Discovery
-------------------------------------------------------------------------- */

/// GET /wiki/search?q=&page=
pub async fn search(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<SearchParams>,
) -> AppResult<impl IntoResponse> {
    let results = state
        .wiki
        .search(params.q.as_deref().unwrap_or(""), params.page.unwrap_or(1))
        .await?;
    Ok(Json(DataResponse { data: results }))
}

/// GET /wiki/random
pub async fn random_page(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let random = state.wiki.random_page().await?;
    Ok(Json(DataResponse { data: random }))
}
