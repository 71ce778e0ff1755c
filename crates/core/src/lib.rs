//! Domain types shared by every tmon crate.
//!
//! Entity models mirror the records the transcoding backend returns from its
//! `/api/v1` list endpoints. [`query`] builds the canonical query strings for
//! those endpoints and [`push_events`] names the push-channel frame types.

pub mod log;
pub mod push_events;
pub mod query;
pub mod task;
pub mod types;
pub mod video;
pub mod worker;
