//! Periodic check of pending requests.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::state::AppState;

/// Poll every pending request each `interval_secs`.
pub fn spawn_poller(state: Arc<AppState>, interval_secs: u64) -> JoinHandle<()> {
    info!(interval_secs, "Request poller spawned as background task");

    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(tokio::time::Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // Skip the first immediate tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let summary = state.orchestrator.lock().await.poll_all().await;
            debug!(
                checked = summary.checked,
                skipped = summary.skipped,
                "Poll tick"
            );
        }
    })
}
