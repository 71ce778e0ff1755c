//! Typed in-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans every published event out to all current receivers.
//! Long-lived consumers register an [`EventHandler`]; the returned
//! [`HandlerRegistration`] must be explicitly unregistered to stop delivery.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust
/// use tmon_events::EventBus;
///
/// let bus: EventBus<&'static str> = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish("task.updated");
/// ```
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone + Send + 'static> EventBus<E> {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: E) {
        // Ignore the SendError; it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Number of live receivers, registered handlers included.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Spawn a task that feeds every subsequent event to `handler`, in
    /// publish order, one at a time.
    ///
    /// Delivery continues until [`HandlerRegistration::unregister`] is called
    /// or the bus is dropped.
    pub fn register_handler<H>(&self, name: &'static str, handler: H) -> HandlerRegistration
    where
        H: EventHandler<E>,
    {
        let mut rx = self.sender.subscribe();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            tracing::debug!(handler = name, "Event handler registered");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(event) => handler.handle(event).await,
                        Err(RecvError::Lagged(skipped)) => handler.lagged(skipped).await,
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            tracing::debug!(handler = name, "Event handler stopped");
        });

        HandlerRegistration {
            name,
            cancel,
            handle,
        }
    }
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// A consumer of bus events.
#[async_trait]
pub trait EventHandler<E>: Send + Sync + 'static {
    async fn handle(&self, event: E);

    /// The handler fell behind and `skipped` events were lost.
    async fn lagged(&self, skipped: u64) {
        tracing::warn!(skipped, "Event handler lagged behind the bus");
    }
}

/// Handle to a running [`EventHandler`] task.
pub struct HandlerRegistration {
    name: &'static str,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl HandlerRegistration {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop delivery and wait for an in-flight `handle` call to finish.
    pub async fn unregister(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(handler = self.name, error = %e, "Event handler task failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
