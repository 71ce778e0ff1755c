//! Client-side state for the transcode cluster monitor.
//!
//! [`SyncStore`] holds the latest known workers, tasks, videos and logs,
//! keeps them fresh through REST fetches and live task pushes, and hands the
//! result out as a [`Snapshot`] over a watch channel.

pub mod error;
mod handler;
mod poller;
pub mod snapshot;
pub mod store;

pub use error::SyncError;
pub use snapshot::{Collection, MergeOutcome, Snapshot, Subscription};
pub use store::{SyncConfig, SyncStore};
