#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use tmon_client::api::{ApiError, ApiRequest, Transport};
use tmon_client::client::{ChannelError, Connector, Link, LinkPeer};

/// Transport that records every request and answers from a script.
///
/// An exhausted script answers `null`.
#[derive(Default)]
pub struct RecordingTransport {
    responses: Mutex<VecDeque<Result<Value, ApiError>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, response: Result<Value, ApiError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn request(&self, request: ApiRequest) -> Result<Value, ApiError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Value::Null))
    }
}

/// In-memory connector. Each successful connect hands the far side of the
/// link to the test through `peers`.
pub struct ScriptedConnector {
    attempts: AtomicU32,
    refuse: AtomicBool,
    peers: mpsc::UnboundedSender<LinkPeer>,
}

impl ScriptedConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LinkPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (
            Self {
                attempts: AtomicU32::new(0),
                refuse: AtomicBool::new(false),
                peers,
            },
            rx,
        )
    }

    /// Make every following connect attempt fail (or succeed again).
    pub fn set_refusing(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<Link, ChannelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
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
