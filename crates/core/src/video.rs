//! Video catalogue records. The client only ever reads these.

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

/// Where a video is in the transcoding pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscodeStatus {
    NotTranscoded,
    Waiting,
    Created,
    Running,
    Completed,
    Failed,
}

impl TranscodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TranscodeStatus::NotTranscoded => "not_transcoded",
            TranscodeStatus::Waiting => "waiting",
            TranscodeStatus::Created => "created",
            TranscodeStatus::Running => "running",
            TranscodeStatus::Completed => "completed",
            TranscodeStatus::Failed => "failed",
        }
    }
}

/// A video as returned by `GET /api/v1/videos`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: DbId,
    #[serde(default)]
    pub video_path: String,
    pub transcode_status: TranscodeStatus,
    pub codec: Option<String>,
    #[serde(default)]
    pub is_vr: bool,
    /// File size in megabytes.
    pub video_size: Option<f64>,
    pub duration_secs: Option<f64>,
    pub bitrate_k: Option<i64>,
    pub fps: Option<f64>,
    pub resolution_x: Option<i32>,
    pub resolution_y: Option<i32>,
    pub updated_at: Option<Timestamp>,
}
