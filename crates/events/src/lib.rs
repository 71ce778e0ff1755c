//! In-process typed event bus.
//!
//! - [`EventBus`] — publish/subscribe hub backed by `tokio::sync::broadcast`.
//! - [`EventHandler`] / [`HandlerRegistration`] — explicitly registered
//!   consumers that run on their own task until unregistered.

pub mod bus;

pub use bus::{EventBus, EventHandler, HandlerRegistration};
