use folio_core::wiki::{WikiConfig, DEFAULT_HOME_TITLE, DEFAULT_LEASE_SECS, DEFAULT_PAGE_SIZE};

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long an edit lease lasts, in seconds (default: `60`).
    pub lock_lease_secs: i64,
    /// How often the expired-lease sweeper runs, in seconds (default: `60`).
    pub lock_sweep_interval_secs: u64,
    /// History and search results per page (default: `10`).
    pub page_size: i64,
    /// Title served by `random` when the wiki is empty (default: `Home`).
    pub home_title: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                    |
    /// |----------------------------|----------------------------|
    /// | `HOST`                     | `0.0.0.0`                  |
    /// | `PORT`                     | `3000`                     |
    /// | `CORS_ORIGINS`             | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                       |
    /// | `LOCK_LEASE_SECS`          | `60`                       |
    /// | `LOCK_SWEEP_INTERVAL_SECS` | `60`                       |
    /// | `WIKI_PAGE_SIZE`           | `10`                       |
    /// | `WIKI_HOME_TITLE`          | `Home`                     |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let lock_lease_secs: i64 = std::env::var("LOCK_LEASE_SECS")
            .unwrap_or_else(|_| DEFAULT_LEASE_SECS.to_string())
            .parse()
            .expect("LOCK_LEASE_SECS must be a valid i64");
        assert!(lock_lease_secs > 0, "LOCK_LEASE_SECS must be positive");

        let lock_sweep_interval_secs: u64 = std::env::var("LOCK_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("LOCK_SWEEP_INTERVAL_SECS must be a valid u64");
        assert!(
            lock_sweep_interval_secs > 0,
            "LOCK_SWEEP_INTERVAL_SECS must be positive"
        );

        let page_size: i64 = std::env::var("WIKI_PAGE_SIZE")
            .unwrap_or_else(|_| DEFAULT_PAGE_SIZE.to_string())
            .parse()
            .expect("WIKI_PAGE_SIZE must be a valid i64");
        assert!(page_size > 0, "WIKI_PAGE_SIZE must be positive");

        let home_title =
            std::env::var("WIKI_HOME_TITLE").unwrap_or_else(|_| DEFAULT_HOME_TITLE.into());

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            lock_lease_secs,
            lock_sweep_interval_secs,
            page_size,
            home_title,
        }
    }

    /// Engine settings derived from this configuration.
    pub fn wiki_config(&self) -> WikiConfig {
        WikiConfig {
            lease: chrono::Duration::seconds(self.lock_lease_secs),
            page_size: self.page_size,
            home_title: self.home_title.clone(),
        }
    }
}
