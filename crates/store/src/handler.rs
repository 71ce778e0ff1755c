//! Bridges channel events on the bus into the store.

use std::sync::Weak;

use async_trait::async_trait;
use tmon_client::events::ChannelEvent;
use tmon_events::EventHandler;

use crate::store::SyncStore;

pub(crate) struct ChannelEventHandler {
    store: Weak<SyncStore>,
}

impl ChannelEventHandler {
    pub(crate) fn new(store: Weak<SyncStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler<ChannelEvent> for ChannelEventHandler {
    async fn handle(&self, event: ChannelEvent) {
        if let Some(store) = self.store.upgrade() {
            store.on_channel_event(event);
        }
    }

    /// Missed pushes cannot be replayed; re-fetch tasks instead.
    async fn lagged(&self, skipped: u64) {
        tracing::warn!(skipped, "Missed task updates, re-fetching tasks");
        if let Some(store) = self.store.upgrade() {
            store.refresh_tasks().await;
        }
    }
}
