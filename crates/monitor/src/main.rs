//! `tmon` -- terminal monitor for a transcode cluster.
//!
//! Loads workers and tasks from the backend REST API, follows selected tasks
//! over the push channel, and logs a summary every time the synchronized
//! state changes. Configuration is read from the environment (see
//! [`MonitorConfig::from_env`]).

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tmon_client::api::TranscodeApi;
use tmon_client::channel::EventChannel;
use tmon_core::query::{TaskListQuery, WorkerListQuery};
use tmon_core::task::TaskStatus;
use tmon_monitor::config::MonitorConfig;
use tmon_store::{Snapshot, SyncStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tmon=info,tmon_store=info,tmon_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MonitorConfig::from_env().context("Invalid configuration")?;

    tracing::info!(
        api_url = %config.api_url,
        ws_url = %config.ws_url,
        refresh_secs = config.refresh_secs,
        "Starting tmon",
    );

    let api = TranscodeApi::http(&config.api_url, config.request_timeout())
        .context("Failed to build HTTP client")?;
    let channel = Arc::new(EventChannel::websocket(config.ws_url.clone(), config.reconnect()));
    let store = SyncStore::start(api, channel, config.sync()).await;

    let workers = WorkerListQuery {
        page: Some(1),
        per_page: Some(config.per_page),
    };
    if let Err(e) = store.fetch_workers(workers).await {
        tracing::warn!(error = %e, "Initial worker fetch failed");
    }

    let tasks = TaskListQuery {
        page: Some(1),
        per_page: Some(config.per_page),
        ..Default::default()
    };
    if let Err(e) = store.fetch_tasks(tasks).await {
        tracing::warn!(error = %e, "Initial task fetch failed");
    }

    for task_id in &config.subscribe {
        store.subscribe_to_task(task_id).await;
    }

    let mut snapshots = store.subscribe();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                log_summary(&snapshot);
            }
        }
    }

    store.shutdown().await;
    Ok(())
}

fn log_summary(snapshot: &Snapshot) {
    let running = snapshot
        .tasks
        .values()
        .filter(|t| t.status == TaskStatus::Running)
        .count();

    tracing::info!(
        workers = snapshot.workers.len(),
        tasks = snapshot.tasks.len(),
        running,
        following = snapshot.subscriptions.len(),
        channel = ?snapshot.channel_state,
        live = snapshot.live_updates_available,
        "State updated",
    );

    for task in snapshot.tasks.values().filter(|t| snapshot.is_subscribed(&t.task_id)) {
        tracing::info!(
            task_id = %task.task_id,
            status = task.status.as_str(),
            progress = task.progress,
            remaining_secs = ?task.remaining_time,
            "Followed task",
        );
    }

    for (collection, error) in &snapshot.errors {
        tracing::warn!(collection = collection.as_str(), error = %error, "Collection unavailable");
    }
}
