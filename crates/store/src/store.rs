//! The synchronization store.
//!
//! [`SyncStore`] is the single source of truth observers read. Fetch actions
//! replace a collection from the REST API, mutations go to the API and then
//! re-fetch what they touched, and task pushes from the [`EventChannel`] are
//! merged as described in [`crate::snapshot`].
//!
//! Fetches are not sequenced: when two fetches of the same collection
//! overlap, whichever resolves last wins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tmon_client::api::{ApiError, TaskUpload, TranscodeApi};
use tmon_client::channel::{ChannelState, EventChannel};
use tmon_client::events::ChannelEvent;
use tmon_client::messages::TaskUpdate;
use tmon_core::log::LogEntry;
use tmon_core::query::{LogListQuery, TaskListQuery, VideoListQuery, WorkerListQuery};
use tmon_core::task::{status_in, Task, TaskStatus};
use tmon_core::types::DbId;
use tmon_core::video::Video;
use tmon_core::worker::{OfflineAction, Worker};
use tmon_events::HandlerRegistration;

use crate::error::SyncError;
use crate::handler::ChannelEventHandler;
use crate::poller::spawn_poller;
use crate::snapshot::{Collection, FetchId, MergeOutcome, Snapshot, Subscription};

/// Default period of the background re-fetch.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Period of the background worker/task re-fetch. Zero disables it.
    pub refresh_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

/// Options of the last fetch per collection, reused by re-fetches.
#[derive(Debug, Clone, Default)]
struct Queries {
    workers: WorkerListQuery,
    tasks: TaskListQuery,
    videos: VideoListQuery,
    logs: LogListQuery,
}

struct Background {
    handler: HandlerRegistration,
    poller: Option<(CancellationToken, tokio::task::JoinHandle<()>)>,
}

pub struct SyncStore {
    api: TranscodeApi,
    channel: Arc<EventChannel>,
    state: watch::Sender<Snapshot>,
    queries: Mutex<Queries>,
    /// Task fetches issued so far.
    task_fetches: AtomicU64,
    background: Mutex<Option<Background>>,
}

impl SyncStore {
    /// Create the store, hook it to `channel`, and start the push channel
    /// and the periodic re-fetch.
    pub async fn start(api: TranscodeApi, channel: Arc<EventChannel>, config: SyncConfig) -> Arc<Self> {
        let (state, _) = watch::channel(Snapshot::default());
        let store = Arc::new(Self {
            api,
            channel: Arc::clone(&channel),
            state,
            queries: Mutex::new(Queries::default()),
            task_fetches: AtomicU64::new(0),
            background: Mutex::new(None),
        });

        let handler = channel.bus().register_handler(
            "sync-store",
            ChannelEventHandler::new(Arc::downgrade(&store)),
        );

        let poller = (!config.refresh_interval.is_zero()).then(|| {
            let cancel = CancellationToken::new();
            let handle = spawn_poller(Arc::downgrade(&store), config.refresh_interval, cancel.clone());
            (cancel, handle)
        });

        *lock(&store.background) = Some(Background { handler, poller });

        channel.start().await;
        tracing::info!(
            refresh_secs = config.refresh_interval.as_secs(),
            "Sync store started"
        );
        store
    }

    /// Stop background work and the push channel.
    pub async fn shutdown(&self) {
        let background = lock(&self.background).take();
        if let Some(background) = background {
            background.handler.unregister().await;
            if let Some((cancel, handle)) = background.poller {
                cancel.cancel();
                let _ = handle.await;
            }
        }
        self.channel.shutdown().await;
        tracing::info!("Sync store stopped");
    }

    // ---- observation ----

    /// Receive every snapshot change from now on.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    pub fn workers(&self) -> Vec<Worker> {
        self.state.borrow().workers.values().cloned().collect()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state.borrow().tasks.values().cloned().collect()
    }

    pub fn videos(&self) -> Vec<Video> {
        self.state.borrow().videos.values().cloned().collect()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.state.borrow().logs.values().cloned().collect()
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.state.borrow().task(task_id).cloned()
    }

    pub fn worker(&self, worker_id: DbId) -> Option<Worker> {
        self.state.borrow().worker(worker_id).cloned()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.state.borrow().subscriptions.values().cloned().collect()
    }

    pub fn is_subscribed(&self, task_id: &str) -> bool {
        self.state.borrow().is_subscribed(task_id)
    }

    pub fn error(&self, collection: Collection) -> Option<ApiError> {
        self.state.borrow().error(collection).cloned()
    }

    pub fn live_updates_available(&self) -> bool {
        self.state.borrow().live_updates_available
    }

    pub fn channel(&self) -> &Arc<EventChannel> {
        &self.channel
    }

    // ---- fetch actions ----

    pub async fn fetch_workers(&self, query: WorkerListQuery) -> Result<(), SyncError> {
        lock(&self.queries).workers = query.clone();
        let result = self.api.list_workers(&query).await;
        self.settle(Collection::Workers, result, Snapshot::replace_workers)
    }

    /// Replace tasks. Subscribed tasks fetched in a terminal status stop
    /// receiving live updates.
    pub async fn fetch_tasks(&self, query: TaskListQuery) -> Result<(), SyncError> {
        lock(&self.queries).tasks = query.clone();
        let fetch_id: FetchId = self.task_fetches.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.api.list_tasks(&query).await;

        let mut finished = Vec::new();
        let settled = self.settle(Collection::Tasks, result, |s, tasks| {
            finished = s.replace_tasks(tasks, fetch_id);
        });
        for task_id in finished {
            tracing::info!(task_id = %task_id, "Task finished, ending live updates");
            self.channel.unsubscribe(&task_id);
        }
        settled
    }

    pub async fn fetch_videos(&self, query: VideoListQuery) -> Result<(), SyncError> {
        lock(&self.queries).videos = query.clone();
        let result = self.api.list_videos(&query).await;
        self.settle(Collection::Videos, result, Snapshot::replace_videos)
    }

    pub async fn fetch_logs(&self, query: LogListQuery) -> Result<(), SyncError> {
        lock(&self.queries).logs = query.clone();
        let result = self.api.list_logs(&query).await;
        self.settle(Collection::Logs, result, Snapshot::replace_logs)
    }

    /// Re-fetch workers and tasks with their remembered options.
    pub async fn refresh(&self) {
        tokio::join!(self.refresh_workers(), self.refresh_tasks());
    }

    pub(crate) async fn refresh_tasks(&self) {
        let query = lock(&self.queries).tasks.clone();
        // Failures are already recorded on the snapshot.
        let _ = self.fetch_tasks(query).await;
    }

    async fn refresh_workers(&self) {
        let query = lock(&self.queries).workers.clone();
        let _ = self.fetch_workers(query).await;
    }

    // ---- mutations ----

    /// Upload a video as a new task, then re-fetch tasks.
    pub async fn create_task(&self, upload: TaskUpload) -> Result<Task, SyncError> {
        let task = self.api.create_task(upload).await?;
        tracing::info!(task_id = %task.task_id, "Task created");
        self.refresh_tasks().await;
        Ok(task)
    }

    pub async fn cancel_task(&self, task_id: &str) -> Result<Task, SyncError> {
        let task = self.api.cancel_task(task_id).await?;
        tracing::info!(task_id, "Task cancelled");
        self.refresh_tasks().await;
        Ok(task)
    }

    /// Stop a worker; its running task is affected too, so both are re-fetched.
    pub async fn stop_worker(&self, worker_id: DbId) -> Result<(), SyncError> {
        self.api.stop_worker(worker_id).await?;
        tracing::info!(worker_id, "Worker stopped");
        self.refresh().await;
        Ok(())
    }

    pub async fn set_worker_offline(&self, worker_id: DbId, action: OfflineAction) -> Result<(), SyncError> {
        self.api.request_worker_offline(worker_id, action).await?;
        tracing::info!(worker_id, ?action, "Worker offline requested");
        self.refresh_workers().await;
        Ok(())
    }

    pub async fn cancel_worker_offline(&self, worker_id: DbId) -> Result<(), SyncError> {
        self.api.cancel_worker_offline(worker_id).await?;
        tracing::info!(worker_id, "Worker offline request cancelled");
        self.refresh_workers().await;
        Ok(())
    }

    // ---- live updates ----

    /// Ask for live updates on `task_id`. Returns `false` if already
    /// subscribed.
    pub async fn subscribe_to_task(&self, task_id: &str) -> bool {
        if self.is_subscribed(task_id) {
            return false;
        }
        self.channel.subscribe(task_id).await;

        let active = self.channel.state() == ChannelState::Connected;
        let mut added = false;
        self.state.send_if_modified(|s| {
            added = s.add_subscription(task_id, active);
            added
        });
        added
    }

    /// Stop live updates on `task_id`. Returns `false` if not subscribed.
    pub fn unsubscribe_from_task(&self, task_id: &str) -> bool {
        self.channel.unsubscribe(task_id);

        let mut removed = false;
        self.state.send_if_modified(|s| {
            removed = s.end_subscription(task_id);
            removed
        });
        removed
    }

    /// Merge one pushed task update.
    ///
    /// An update that moves the task to a terminal status ends its
    /// subscription.
    pub fn apply_task_update(&self, update: &TaskUpdate) -> MergeOutcome {
        let issued = self.task_fetches.load(Ordering::SeqCst);
        let mut outcome = MergeOutcome::Ignored;
        self.state.send_if_modified(|s| {
            outcome = s.merge_task_update(update, issued);
            matches!(outcome, MergeOutcome::Applied | MergeOutcome::Buffered)
        });

        match outcome {
            MergeOutcome::Applied | MergeOutcome::Buffered => {
                tracing::trace!(task_id = %update.task_id, ?outcome, "Task update merged");
                if status_in(&update.fields).is_some_and(TaskStatus::is_terminal) {
                    tracing::info!(task_id = %update.task_id, "Task finished, ending live updates");
                    self.unsubscribe_from_task(&update.task_id);
                }
            }
            MergeOutcome::Ignored => {
                tracing::debug!(task_id = %update.task_id, "Ignoring update for unsubscribed task");
            }
            MergeOutcome::Rejected => {}
        }
        outcome
    }

    pub(crate) fn on_channel_event(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::TaskUpdate(update) => {
                self.apply_task_update(&update);
            }
            ChannelEvent::Connected => self.state.send_modify(|s| {
                s.channel_state = ChannelState::Connected;
                s.live_updates_available = true;
                s.channel_error = None;
                s.set_subscriptions_active(true);
            }),
            ChannelEvent::Disconnected => {
                let state = self.channel.state();
                self.state.send_modify(|s| {
                    s.channel_state = state;
                    s.set_subscriptions_active(false);
                });
            }
            ChannelEvent::ConnectivityDegraded { attempts } => {
                tracing::warn!(attempts, "Live updates unavailable, relying on periodic refresh");
                self.state.send_modify(|s| {
                    s.channel_state = ChannelState::Disconnected;
                    s.live_updates_available = false;
                    s.channel_error = Some(SyncError::ConnectivityDegraded);
                    s.set_subscriptions_active(false);
                });
            }
        }
    }

    // ---- private helpers ----

    /// Install a fetch result, or empty the collection and record the error.
    fn settle<T>(
        &self,
        collection: Collection,
        result: Result<Vec<T>, ApiError>,
        install: impl FnOnce(&mut Snapshot, Vec<T>),
    ) -> Result<(), SyncError> {
        match result {
            Ok(items) => {
                let count = items.len();
                self.state.send_modify(|s| {
                    install(s, items);
                    s.errors.shift_remove(&collection);
                });
                tracing::debug!(collection = collection.as_str(), count, "Collection fetched");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(collection = collection.as_str(), error = %e, "Fetch failed, collection cleared");
                self.state.send_modify(|s| {
                    s.clear(collection);
                    s.errors.insert(collection, e.clone());
                });
                Err(e.into())
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Guarded values are replaced whole, so a poisoned lock is still consistent.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
