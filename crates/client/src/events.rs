//! Events published by the [`EventChannel`](crate::channel::EventChannel).
//!
//! These are the only signals the synchronization store receives from the
//! push side; raw frames never leave this crate.

use crate::messages::TaskUpdate;

/// A channel-level event delivered on the channel's event bus.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The push connection is up and queued subscriptions were replayed.
    Connected,

    /// The push connection dropped.
    Disconnected,

    /// The backend pushed a partial record for a task.
    TaskUpdate(TaskUpdate),

    /// Reconnection gave up after `attempts` tries; live updates are
    /// unavailable until the channel is restarted.
    ConnectivityDegraded { attempts: u32 },
}
