//! REST and push-channel client for the transcode cluster backend.
//!
//! Provides the envelope-unwrapping REST transport and typed endpoint
//! wrappers, push frame parsing, the WebSocket connector, reconnection
//! policy, and the [`EventChannel`](channel::EventChannel) that owns the
//! single live-update connection.

pub mod api;
pub mod channel;
pub mod client;
pub mod events;
pub mod messages;
pub mod reconnect;
mod session;
