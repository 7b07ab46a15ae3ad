//! Periodic release of expired edit leases.
//!
//! Acquiring a lease already reclaims an expired one on the page being
//! edited; this job clears the rest so abandoned edits do not leave pages
//! looking locked.

use std::sync::Arc;
use std::time::Duration;

use folio_core::service::WikiService;
use tokio_util::sync::CancellationToken;

/// Run the sweeper loop every `every` until `cancel` is triggered.
pub async fn run(wiki: Arc<WikiService>, every: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = every.as_secs(), "Lock sweeper started");

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Lock sweeper stopping");
                break;
            }
            _ = interval.tick() => {
                match wiki.sweep_expired_locks().await {
                    Ok(cleared) => {
                        if cleared > 0 {
                            tracing::info!(cleared, "Lock sweeper: released expired leases");
                        } else {
                            tracing::debug!("Lock sweeper: nothing to release");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Lock sweeper: sweep failed");
                    }
                }
            }
        }
    }
}
