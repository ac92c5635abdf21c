//! Periodic sweep driving the in-process backend's expiry.

use log::{info, warn};
use paperchat_store::ChatStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Spawn the cleanup sweep at the given interval.
///
/// Only the memory backend needs this; the redis backend expires entries
/// on its own, so the server does not spawn a sweep for it.
pub fn spawn_cleanup_task(store: Arc<dyn ChatStore>, interval_minutes: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(Duration::from_secs(interval_minutes * 60));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so the sweep starts one
        // full interval after boot.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.cleanup_inactive().await {
                Ok(0) => {}
                Ok(removed) => info!("cleanup sweep removed {removed} conversations"),
                Err(err) => warn!("cleanup sweep failed: {err}"),
            }
        }
    })
}
