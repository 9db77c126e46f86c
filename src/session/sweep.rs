//! Periodic sweep of sessions past the refresh window.
//!
//! Storage hygiene only: no single request depends on the sweep for
//! correctness. It can run beside live traffic because `delete` is
//! idempotent and an in-flight `rotate` against a swept session resolves to
//! `NotFound`.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

use super::store::SessionStore;

/// Spawn a background task that removes sessions older than
/// `max_age_seconds` every `interval`.
pub fn spawn_session_sweeper(
    store: Arc<dyn SessionStore>,
    interval: Duration,
    max_age_seconds: i64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval = if interval.is_zero() {
            Duration::from_secs(1)
        } else {
            interval
        };

        loop {
            match store.delete_older_than(max_age_seconds).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "swept aged sessions"),
                Err(err) => error!("session sweep failed: {err}"),
            }

            sleep(interval).await;
        }
    })
}
