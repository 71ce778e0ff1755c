//! Transcode log entries (append-only on the backend).

use serde::{Deserialize, Serialize};

use crate::types::{DbId, TaskId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

/// A log line as returned inside `GET /api/v1/logs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: DbId,
    pub level: LogLevel,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub message: String,
    pub task_id: Option<TaskId>,
    pub worker_id: Option<DbId>,
}

/// `GET /api/v1/logs` wraps its list in a `logs` key.
#[derive(Debug, Default, Deserialize)]
pub struct LogList {
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}
