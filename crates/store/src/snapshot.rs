//! The observable store state and its merge rules.
//!
//! Fetches replace a collection wholesale. Live task pushes are kept as a
//! per-task overlay while the task is subscribed: the overlay is applied to
//! the local record right away and re-applied on top of task fetches that
//! were issued before the push arrived, so the visible state is the same
//! whichever of the two arrives first.
//!
//! Task fetches are numbered as they are issued. Each pushed field remembers
//! the number of the latest fetch issued when it arrived; a fetch with a
//! higher number saw the backend after the push and supersedes the field.

use chrono::Utc;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tmon_client::api::ApiError;
use tmon_client::channel::ChannelState;
use tmon_client::messages::TaskUpdate;
use tmon_core::log::LogEntry;
use tmon_core::task::Task;
use tmon_core::types::{DbId, TaskId, Timestamp};
use tmon_core::video::Video;
use tmon_core::worker::Worker;

use crate::error::SyncError;

/// The fetched collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Workers,
    Tasks,
    Videos,
    Logs,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Workers => "workers",
            Collection::Tasks => "tasks",
            Collection::Videos => "videos",
            Collection::Logs => "logs",
        }
    }
}

/// Live-update registration for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub task_id: TaskId,
    /// `true` while the push channel is connected and delivering.
    pub active: bool,
    pub since: Timestamp,
}

/// Result of merging one task push into the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No subscription for the task.
    Ignored,
    /// Task not known locally yet; held for the next task fetch.
    Buffered,
    /// Overlaid onto the local record.
    Applied,
    /// Field values did not fit the task record.
    Rejected,
}

/// Number of a task fetch, in issue order starting at 1.
pub(crate) type FetchId = u64;

#[derive(Debug, Clone, PartialEq)]
struct Pushed {
    value: Value,
    /// Latest task fetch issued when the value arrived.
    after: FetchId,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Overlay {
    fields: IndexMap<String, Pushed>,
    /// Subscription ended; dropped once a newer fetch has resolved.
    retired: bool,
}

impl Overlay {
    fn values(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(name, pushed)| (name.clone(), pushed.value.clone()))
            .collect()
    }

    fn latest(&self) -> FetchId {
        self.fields.values().map(|p| p.after).max().unwrap_or_default()
    }
}

/// Everything observers can read, published as one value.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub workers: IndexMap<DbId, Worker>,
    pub tasks: IndexMap<TaskId, Task>,
    pub videos: IndexMap<DbId, Video>,
    pub logs: IndexMap<DbId, LogEntry>,
    pub subscriptions: IndexMap<TaskId, Subscription>,
    /// Last fetch error per collection, cleared by the next successful fetch.
    pub errors: IndexMap<Collection, ApiError>,
    pub channel_state: ChannelState,
    /// Cleared when the push channel gives up reconnecting.
    pub live_updates_available: bool,
    pub channel_error: Option<SyncError>,
    pub(crate) overlays: IndexMap<TaskId, Overlay>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            workers: IndexMap::new(),
            tasks: IndexMap::new(),
            videos: IndexMap::new(),
            logs: IndexMap::new(),
            subscriptions: IndexMap::new(),
            errors: IndexMap::new(),
            channel_state: ChannelState::Disconnected,
            live_updates_available: true,
            channel_error: None,
            overlays: IndexMap::new(),
        }
    }
}

impl Snapshot {
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    pub fn worker(&self, worker_id: DbId) -> Option<&Worker> {
        self.workers.get(&worker_id)
    }

    pub fn is_subscribed(&self, task_id: &str) -> bool {
        self.subscriptions.contains_key(task_id)
    }

    pub fn error(&self, collection: Collection) -> Option<&ApiError> {
        self.errors.get(&collection)
    }

    pub(crate) fn replace_workers(&mut self, workers: Vec<Worker>) {
        self.workers = workers.into_iter().map(|w| (w.id, w)).collect();
    }

    pub(crate) fn replace_videos(&mut self, videos: Vec<Video>) {
        self.videos = videos.into_iter().map(|v| (v.id, v)).collect();
    }

    pub(crate) fn replace_logs(&mut self, logs: Vec<LogEntry>) {
        self.logs = logs.into_iter().map(|l| (l.id, l)).collect();
    }

    /// Install the result of task fetch `fetch_id`.
    ///
    /// Pushed fields newer than the fetch are laid back on top; older ones
    /// are superseded and dropped. Subscribed tasks the fetch reports in a
    /// terminal status lose their subscription, and their ids are returned.
    pub(crate) fn replace_tasks(&mut self, tasks: Vec<Task>, fetch_id: FetchId) -> Vec<TaskId> {
        let mut fresh: IndexMap<TaskId, Task> =
            tasks.into_iter().map(|t| (t.task_id.clone(), t)).collect();

        self.overlays.retain(|task_id, overlay| {
            if let Some(task) = fresh.get_mut(task_id) {
                overlay.fields.retain(|_, pushed| pushed.after >= fetch_id);
                if !overlay.fields.is_empty() {
                    match task.with_overlay(&overlay.values()) {
                        Ok(merged) => *task = merged,
                        Err(e) => {
                            tracing::warn!(task_id = %task_id, error = %e, "Dropping overlay that no longer fits");
                            return false;
                        }
                    }
                }
            }
            !overlay.fields.is_empty() && !(overlay.retired && fetch_id > overlay.latest())
        });

        self.tasks = fresh;

        let finished: Vec<TaskId> = self
            .subscriptions
            .keys()
            .filter(|id| self.tasks.get(*id).is_some_and(|t| t.status.is_terminal()))
            .cloned()
            .collect();
        for task_id in &finished {
            self.end_subscription(task_id);
        }
        finished
    }

    /// Empty a collection after a failed fetch.
    pub(crate) fn clear(&mut self, collection: Collection) {
        match collection {
            Collection::Workers => self.workers.clear(),
            Collection::Tasks => self.tasks.clear(),
            Collection::Videos => self.videos.clear(),
            Collection::Logs => self.logs.clear(),
        }
    }

    /// Merge one task push. `issued` is the latest task fetch issued so far.
    pub(crate) fn merge_task_update(&mut self, update: &TaskUpdate, issued: FetchId) -> MergeOutcome {
        if !self.subscriptions.contains_key(&update.task_id) {
            return MergeOutcome::Ignored;
        }

        let outcome = match self.tasks.get_mut(&update.task_id) {
            Some(task) => match task.with_overlay(&update.fields) {
                Ok(merged) => {
                    *task = merged;
                    MergeOutcome::Applied
                }
                Err(e) => {
                    tracing::warn!(task_id = %update.task_id, error = %e, "Dropping task update that does not fit");
                    return MergeOutcome::Rejected;
                }
            },
            None => MergeOutcome::Buffered,
        };

        let overlay = self.overlays.entry(update.task_id.clone()).or_default();
        for (name, value) in &update.fields {
            overlay.fields.insert(
                name.clone(),
                Pushed {
                    value: value.clone(),
                    after: issued,
                },
            );
        }
        outcome
    }

    /// Record a subscription. Returns `false` if one already exists.
    pub(crate) fn add_subscription(&mut self, task_id: &str, active: bool) -> bool {
        if self.subscriptions.contains_key(task_id) {
            return false;
        }
        self.subscriptions.insert(
            task_id.to_string(),
            Subscription {
                task_id: task_id.to_string(),
                active,
                since: Utc::now(),
            },
        );
        if let Some(overlay) = self.overlays.get_mut(task_id) {
            overlay.retired = false;
        }
        true
    }

    /// Drop a subscription and retire its overlay.
    pub(crate) fn end_subscription(&mut self, task_id: &str) -> bool {
        if let Some(overlay) = self.overlays.get_mut(task_id) {
            overlay.retired = true;
        }
        self.subscriptions.shift_remove(task_id).is_some()
    }

    pub(crate) fn set_subscriptions_active(&mut self, active: bool) {
        for subscription in self.subscriptions.values_mut() {
            subscription.active = active;
        }
    }
}
