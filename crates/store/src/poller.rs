//! Periodic re-fetch of workers and tasks.
//!
//! Covers changes the push channel does not carry (worker status, tasks
//! nobody subscribed to) and keeps data moving while live updates are down.

use std::sync::Weak;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::store::SyncStore;

/// Spawn the refresh loop. It stops when `cancel` fires or the store is
/// dropped.
pub(crate) fn spawn_poller(
    store: Weak<SyncStore>,
    period: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = period.as_secs(), "Refresh poller started");

        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let Some(store) = store.upgrade() else { break };
                    tracing::debug!("Periodic refresh");
                    store.refresh().await;
                }
            }
        }

        tracing::info!("Refresh poller stopped");
    })
}
