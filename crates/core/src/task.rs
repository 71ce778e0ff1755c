//! Transcode task records and their status lifecycle.

use serde::de::{self, Deserializer, Unexpected};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{DbId, TaskId, Timestamp};

/// Lifecycle status of a transcode task.
///
/// Serialized by name. Deserializes from the name or from the backend's
/// integer code (see [`TaskStatus::from_code`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

const STATUS_NAMES: &[&str] = &["queued", "running", "completed", "failed", "cancelled"];

impl TaskStatus {
    /// Status for the backend's integer code: `0` queued, `1` running,
    /// `2` completed, `3` failed, `4` cancelled.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(TaskStatus::Queued),
            1 => Some(TaskStatus::Running),
            2 => Some(TaskStatus::Completed),
            3 => Some(TaskStatus::Failed),
            4 => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "queued" => Some(TaskStatus::Queued),
            "running" => Some(TaskStatus::Running),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    /// Wire name, as used in query strings and JSON bodies.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// `true` once the task can no longer change status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Name(String),
            Code(u64),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Name(name) => {
                TaskStatus::from_name(&name).ok_or_else(|| de::Error::unknown_variant(&name, STATUS_NAMES))
            }
            Wire::Code(code) => TaskStatus::from_code(code)
                .ok_or_else(|| de::Error::invalid_value(Unexpected::Unsigned(code), &"a task status code from 0 to 4")),
        }
    }
}

/// A task as returned by `GET /api/v1/tasks`.
///
/// Push events carry a subset of these fields keyed by `task_id`; see
/// [`Task::with_overlay`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub video_id: Option<DbId>,
    /// Completion fraction in `0.0..=1.0`.
    #[serde(default)]
    pub progress: f64,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    pub worker_id: Option<DbId>,
    pub worker_name: Option<String>,
    pub video_path: Option<String>,
    pub dest_path: Option<String>,
    pub error_message: Option<String>,
    /// Seconds since the task started running.
    pub elapsed_time: Option<f64>,
    /// Estimated seconds until completion.
    pub remaining_time: Option<f64>,
}

impl Task {
    /// Return a copy of this task with `fields` shallow-merged on top.
    ///
    /// Keys the record does not know are ignored. `task_id` is never
    /// overwritten. Fails when a field value does not fit the record
    /// (e.g. a string where `progress` expects a number).
    pub fn with_overlay(&self, fields: &Map<String, Value>) -> Result<Task, serde_json::Error> {
        let Value::Object(mut record) = serde_json::to_value(self)? else {
            return Ok(self.clone());
        };

        for (key, value) in fields {
            if key == "task_id" || !record.contains_key(key) {
                continue;
            }
            record.insert(key.clone(), value.clone());
        }

        serde_json::from_value(Value::Object(record))
    }
}

/// Read a task status out of a partial push payload, if it carries one.
pub fn status_in(fields: &Map<String, Value>) -> Option<TaskStatus> {
    fields
        .get("status")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// Body of `PATCH /api/v1/tasks/{task_id}`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatusUpdate {
    pub status: TaskStatus,
}
