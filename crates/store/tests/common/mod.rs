#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use tmon_client::api::{ApiError, ApiRequest, Method, TranscodeApi, Transport};
use tmon_client::channel::EventChannel;
use tmon_client::client::{ChannelError, Connector, Link, LinkPeer};
use tmon_client::reconnect::ReconnectConfig;
use tmon_store::{SyncConfig, SyncStore};

enum Reply {
    Ready(Result<Value, ApiError>),
    Gated(oneshot::Receiver<Result<Value, ApiError>>),
}

/// Scripted backend keyed by method and path (query string ignored).
///
/// Unscripted routes answer `null`.
#[derive(Default)]
pub struct FakeBackend {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

fn route(method: Method, path: &str) -> String {
    let path = path.split('?').next().unwrap_or(path);
    format!("{method:?} {path}")
}

impl FakeBackend {
    pub fn reply(&self, method: Method, path: &str, reply: Result<Value, ApiError>) {
        self.push(method, path, Reply::Ready(reply));
    }

    /// Hold the reply until the returned sender fires.
    pub fn gate(&self, method: Method, path: &str) -> oneshot::Sender<Result<Value, ApiError>> {
        let (tx, rx) = oneshot::channel();
        self.push(method, path, Reply::Gated(rx));
        tx
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// `METHOD path` of every request so far, query strings included.
    pub fn calls(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| format!("{:?} {}", r.method, r.path))
            .collect()
    }

    fn push(&self, method: Method, path: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(route(method, path))
            .or_default()
            .push_back(reply);
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn request(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let key = route(request.method, &request.path);
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);

        match reply {
            Some(Reply::Ready(result)) => result,
            Some(Reply::Gated(rx)) => rx.await.unwrap(),
            None => Ok(Value::Null),
        }
    }
}

/// In-memory connector handing each link's far side to the test.
pub struct ScriptedConnector {
    refuse: AtomicBool,
    peers: mpsc::UnboundedSender<LinkPeer>,
}

impl ScriptedConnector {
    pub fn set_refusing(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<Link, ChannelError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ChannelError::Connection("connection refused".into()));
        }
        let (link, peer) = Link::in_memory();
        self.peers
            .send(peer)
            .map_err(|_| ChannelError::Connection("test harness gone".into()))?;
        Ok(link)
    }

    fn endpoint(&self) -> &str {
        "memory://scripted"
    }
}

pub struct Harness {
    pub store: Arc<SyncStore>,
    pub backend: Arc<FakeBackend>,
    pub connector: Arc<ScriptedConnector>,
    pub peers: mpsc::UnboundedReceiver<LinkPeer>,
}

/// Store over a fake backend and an in-memory channel, without the poller.
pub async fn harness() -> Harness {
    let config = SyncConfig {
        refresh_interval: std::time::Duration::ZERO,
    };
    harness_with(config, false).await
}

pub async fn harness_with(config: SyncConfig, refuse: bool) -> Harness {
    build(config, refuse, None).await
}

/// Like [`harness`], with a channel whose event bus holds `capacity` events.
pub async fn harness_with_bus_capacity(capacity: usize) -> Harness {
    let config = SyncConfig {
        refresh_interval: std::time::Duration::ZERO,
    };
    build(config, false, Some(capacity)).await
}

async fn build(config: SyncConfig, refuse: bool, bus_capacity: Option<usize>) -> Harness {
    let backend = Arc::new(FakeBackend::default());
    let (peers_tx, peers) = mpsc::unbounded_channel();
    let connector = Arc::new(ScriptedConnector {
        refuse: AtomicBool::new(refuse),
        peers: peers_tx,
    });
    let channel = Arc::new(match bus_capacity {
        Some(capacity) => EventChannel::with_bus_capacity(connector.clone(), ReconnectConfig::default(), capacity),
        None => EventChannel::new(connector.clone(), ReconnectConfig::default()),
    });
    let store = SyncStore::start(TranscodeApi::new(backend.clone()), channel, config).await;

    Harness {
        store,
        backend,
        connector,
        peers,
    }
}
