//! Push-channel frame type constants.
//!
//! Every frame on the task-update WebSocket is a JSON object tagged by a
//! `"type"` field. The client routes inbound frames on these names and
//! stamps outbound frames with them.

/// Partial task record pushed by the backend for a subscribed task.
pub const MSG_TYPE_TASK_UPDATE: &str = "task_update";

/// Client request to start receiving updates for one task.
pub const MSG_TYPE_SUBSCRIBE: &str = "subscribe";

/// Client request to stop receiving updates for one task.
pub const MSG_TYPE_UNSUBSCRIBE: &str = "unsubscribe";
