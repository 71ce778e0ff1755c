//! The live-update channel.
//!
//! [`EventChannel`] owns the one push connection of the process. It runs a
//! connection task (connect -> pump frames -> reconnect), keeps the set of
//! task subscription intents, and replays those intents every time the
//! connection comes up. Everything it learns is published as a
//! [`ChannelEvent`] on its [`EventBus`].
//!
//! State moves `Disconnected -> Connecting -> Connected -> Disconnected ->
//! Reconnecting -> ...`. When reconnection gives up the channel stays
//! `Disconnected` and publishes a single
//! [`ChannelEvent::ConnectivityDegraded`]; calling [`EventChannel::start`]
//! again restarts it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use indexmap::IndexSet;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tmon_core::types::TaskId;
use tmon_events::EventBus;

use crate::client::{Connector, Link, WsConnector};
use crate::events::ChannelEvent;
use crate::messages::{ClientMessage, PushMessage};
use crate::reconnect::{reconnect_loop, ReconnectConfig, ReconnectOutcome};

/// How long [`EventChannel::shutdown`] waits for the connection task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection state of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Process-wide push connection with subscription bookkeeping.
///
/// Created once at startup and shared as `Arc<EventChannel>`.
pub struct EventChannel {
    shared: Arc<Shared>,
    runner: tokio::sync::Mutex<Option<Runner>>,
}

struct Shared {
    connector: Arc<dyn Connector>,
    reconnect: ReconnectConfig,
    bus: EventBus<ChannelEvent>,
    state: watch::Sender<ChannelState>,
    /// Guards intents and the live sender together so that subscribe calls
    /// and the replay on connect cannot interleave.
    registry: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    /// Tasks the client wants updates for, in registration order.
    intents: IndexSet<TaskId>,
    /// Present only while connected.
    outbound: Option<mpsc::UnboundedSender<ClientMessage>>,
}

struct Runner {
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl EventChannel {
    pub fn new(connector: Arc<dyn Connector>, reconnect: ReconnectConfig) -> Self {
        Self::with_bus(connector, reconnect, EventBus::default())
    }

    /// Like [`new`](Self::new), buffering at most `capacity` undelivered
    /// events per bus receiver.
    pub fn with_bus_capacity(connector: Arc<dyn Connector>, reconnect: ReconnectConfig, capacity: usize) -> Self {
        Self::with_bus(connector, reconnect, EventBus::new(capacity))
    }

    fn with_bus(connector: Arc<dyn Connector>, reconnect: ReconnectConfig, bus: EventBus<ChannelEvent>) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                connector,
                reconnect,
                bus,
                state,
                registry: Mutex::new(Registry::default()),
            }),
            runner: tokio::sync::Mutex::new(None),
        }
    }

    /// Channel over the backend WebSocket at `ws_url`.
    pub fn websocket(ws_url: impl Into<String>, reconnect: ReconnectConfig) -> Self {
        Self::new(Arc::new(WsConnector::new(ws_url)), reconnect)
    }

    /// Spawn the connection task unless it is already running.
    ///
    /// After reconnection was exhausted this starts a fresh connection
    /// attempt.
    pub async fn start(&self) {
        let mut runner = self.runner.lock().await;
        if runner.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return;
        }
        *runner = Some(self.spawn_runner());
    }

    /// Register interest in live updates for `task_id`.
    ///
    /// Starts the channel if it was never started. Sends the subscribe frame
    /// right away when connected, otherwise queues it for the next connect.
    /// Returns `false` if the task was already subscribed.
    pub async fn subscribe(&self, task_id: &str) -> bool {
        self.ensure_started().await;

        let mut registry = self.shared.registry();
        if !registry.intents.insert(task_id.to_string()) {
            return false;
        }
        if let Some(outbound) = &registry.outbound {
            let _ = outbound.send(ClientMessage::Subscribe(task_id.to_string()));
        }
        tracing::debug!(task_id, connected = registry.outbound.is_some(), "Task subscribed");
        true
    }

    /// Drop interest in `task_id`, including a still-queued intent.
    ///
    /// Returns `false` if the task was not subscribed.
    pub fn unsubscribe(&self, task_id: &str) -> bool {
        let mut registry = self.shared.registry();
        if !registry.intents.shift_remove(task_id) {
            return false;
        }
        if let Some(outbound) = &registry.outbound {
            let _ = outbound.send(ClientMessage::Unsubscribe(task_id.to_string()));
        }
        tracing::debug!(task_id, "Task unsubscribed");
        true
    }

    /// Task ids with a registered intent, in registration order.
    pub fn subscriptions(&self) -> Vec<TaskId> {
        self.shared.registry().intents.iter().cloned().collect()
    }

    pub fn is_subscribed(&self, task_id: &str) -> bool {
        self.shared.registry().intents.contains(task_id)
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    /// Watch connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    /// Receive every channel event published from now on.
    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.bus.subscribe()
    }

    /// The bus channel events are published on, for handler registration.
    pub fn bus(&self) -> &EventBus<ChannelEvent> {
        &self.shared.bus
    }

    /// Stop the connection task and close the connection.
    ///
    /// Waits up to 5 seconds for the task to exit.
    pub async fn shutdown(&self) {
        let Some(runner) = self.runner.lock().await.take() else {
            return;
        };
        tracing::info!(endpoint = self.shared.connector.endpoint(), "Shutting down push channel");
        runner.cancel.cancel();
        let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, runner.handle).await;
    }

    // ---- private helpers ----

    async fn ensure_started(&self) {
        let mut runner = self.runner.lock().await;
        if runner.is_none() {
            *runner = Some(self.spawn_runner());
        }
    }

    fn spawn_runner(&self) -> Runner {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let shared = Arc::clone(&self.shared);

        let handle = tokio::spawn(async move {
            tracing::info!(endpoint = shared.connector.endpoint(), "Starting push channel task");
            shared.run_connection_loop(&token).await;
            tracing::info!(endpoint = shared.connector.endpoint(), "Push channel task exited");
        });

        Runner { cancel, handle }
    }
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        // Every registry update is a single statement, so a poisoned lock is still consistent.
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: ChannelState) {
        self.state.send_replace(state);
    }

    /// Core connection loop: connect -> pump frames -> reconnect.
    ///
    /// Runs until cancelled or until reconnection is exhausted.
    async fn run_connection_loop(&self, cancel: &CancellationToken) {
        self.set_state(ChannelState::Connecting);

        let first = tokio::select! {
            _ = cancel.cancelled() => {
                self.set_state(ChannelState::Disconnected);
                return;
            }
            result = self.connector.connect() => result,
        };

        let mut link = match first {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(error = %e, "Push connection failed, entering reconnect loop");
                match self.reconnect(cancel).await {
                    Some(link) => link,
                    None => return,
                }
            }
        };

        loop {
            let Link {
                outbound,
                mut inbound,
            } = link;

            self.on_connected(outbound);
            self.pump(&mut inbound, cancel).await;
            self.on_disconnected();

            if cancel.is_cancelled() {
                return;
            }

            tracing::info!("Push connection lost, entering reconnect loop");
            link = match self.reconnect(cancel).await {
                Some(link) => link,
                None => return,
            };
        }
    }

    /// Install the live sender and replay every registered intent.
    fn on_connected(&self, outbound: mpsc::UnboundedSender<ClientMessage>) {
        let replayed = {
            let mut registry = self.registry();
            for task_id in &registry.intents {
                let _ = outbound.send(ClientMessage::Subscribe(task_id.clone()));
            }
            registry.outbound = Some(outbound);
            self.set_state(ChannelState::Connected);
            registry.intents.len()
        };

        tracing::info!(replayed, "Push channel connected");
        self.bus.publish(ChannelEvent::Connected);
    }

    fn on_disconnected(&self) {
        self.registry().outbound = None;
        self.set_state(ChannelState::Disconnected);
        self.bus.publish(ChannelEvent::Disconnected);
    }

    /// Route inbound frames until the link closes or the task is cancelled.
    async fn pump(&self, inbound: &mut mpsc::UnboundedReceiver<PushMessage>, cancel: &CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                message = inbound.recv() => match message {
                    Some(PushMessage::TaskUpdate(update)) => {
                        tracing::trace!(task_id = %update.task_id, "Task update received");
                        self.bus.publish(ChannelEvent::TaskUpdate(update));
                    }
                    None => return,
                }
            }
        }
    }

    async fn reconnect(&self, cancel: &CancellationToken) -> Option<Link> {
        self.set_state(ChannelState::Reconnecting);

        match reconnect_loop(self.connector.as_ref(), &self.reconnect, cancel).await {
            ReconnectOutcome::Connected(link) => Some(link),
            ReconnectOutcome::Exhausted { attempts } => {
                self.set_state(ChannelState::Disconnected);
                tracing::error!(
                    endpoint = self.connector.endpoint(),
                    attempts,
                    "Push channel unreachable, live updates unavailable",
                );
                self.bus.publish(ChannelEvent::ConnectivityDegraded { attempts });
                None
            }
            ReconnectOutcome::Cancelled => {
                self.set_state(ChannelState::Disconnected);
                None
            }
        }
    }
}
