/// Integer primary keys assigned by the backend.
pub type DbId = i64;

/// Backend-issued task key; push events address tasks by this value.
pub type TaskId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
