use std::sync::Arc;

use folio_core::service::WikiService;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// The wiki engine, over whichever store the binary wired in.
    pub wiki: Arc<WikiService>,
}
