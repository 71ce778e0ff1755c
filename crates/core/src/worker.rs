//! Transcode worker records.

use serde::{Deserialize, Serialize};

use crate::types::{DbId, TaskId, Timestamp};

/// Availability of a worker as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Offline,
    /// An offline request is waiting for the current task to finish.
    OfflinePending,
}

/// Encoder backend a worker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerType {
    Cpu,
    Nvenc,
    Qsv,
    Vpu,
}

/// A worker as returned inside `GET /api/v1/workers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: DbId,
    #[serde(default)]
    pub name: String,
    pub status: WorkerStatus,
    pub worker_type: Option<WorkerType>,
    #[serde(default)]
    pub support_vr: bool,
    pub current_task_id: Option<TaskId>,
    pub last_heartbeat: Option<Timestamp>,
}

/// How a worker should go offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfflineAction {
    /// Stop taking tasks and abort the running one.
    Immediate,
    /// Finish the running task first (`offline_pending` until then).
    Graceful,
}

/// Body of `POST /api/v1/workers/{id}/offline`.
#[derive(Debug, Clone, Serialize)]
pub struct OfflineRequest {
    pub action: OfflineAction,
}

/// `GET /api/v1/workers` wraps its list in a `workers` key.
#[derive(Debug, Default, Deserialize)]
pub struct WorkerList {
    #[serde(default)]
    pub workers: Vec<Worker>,
}
