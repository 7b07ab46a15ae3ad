#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;

use folio_api::config::ServerConfig;
use folio_api::router::build_app_router;
use folio_api::state::AppState;
use folio_core::clock::ManualClock;
use folio_core::lock::LockManager;
use folio_core::memory_store::MemoryStore;
use folio_core::render::MarkupRenderer;
use folio_core::service::WikiService;

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default),
/// a 30-second request timeout and a page size of 3 so paging is cheap to
/// exercise.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        lock_lease_secs: 60,
        lock_sweep_interval_secs: 60,
        page_size: 3,
        home_title: "Home".to_string(),
    }
}

/// The router plus handles on what sits behind it.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub config: ServerConfig,
}

impl TestApp {
    /// A lock manager over the same store and clock the app uses, for
    /// holding leases the way a concurrent editor would.
    pub fn locks(&self) -> LockManager {
        LockManager::new(
            self.store.clone(),
            self.clock.clone(),
            self.config.wiki_config().lease,
        )
    }
}

/// Build the full application router over an in-memory store and a manual
/// clock, with the same middleware stack production uses.
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let store = Arc::new(MemoryStore::new());
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));

    let wiki = Arc::new(WikiService::new(
        store.clone(),
        clock.clone(),
        Arc::new(MarkupRenderer),
        config.wiki_config(),
    ));
    let state = AppState {
        config: Arc::new(config.clone()),
        wiki,
    };

    TestApp {
        router: build_app_router(state, &config),
        store,
        clock,
        config,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: &TestApp, method: Method, uri: &str, body: Option<serde_json::Value>) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &TestApp, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn put_json(app: &TestApp, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::PUT, uri, Some(body)).await
}

pub async fn post(app: &TestApp, uri: &str) -> Response<Body> {
    send(app, Method::POST, uri, None).await
}

pub async fn delete(app: &TestApp, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, None).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
