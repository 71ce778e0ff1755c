//! Push-channel connectors.
//!
//! A [`Connector`] establishes one physical connection and hands back a
//! [`Link`]: a pair of in-process channels carrying parsed frames.
//! [`WsConnector`] is the production implementation over WebSocket; the
//! inbound side of its link closes when the socket drops.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::messages::{ClientMessage, PushMessage};
use crate::session::run_session;

/// Client side of an established push connection.
///
/// Dropping `outbound` asks the connection to close. `inbound` yielding
/// `None` means the connection is gone.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<ClientMessage>,
    pub inbound: mpsc::UnboundedReceiver<PushMessage>,
}

/// Far side of a [`Link`], driven by whatever owns the physical socket.
pub struct LinkPeer {
    pub outbound: mpsc::UnboundedReceiver<ClientMessage>,
    pub inbound: mpsc::UnboundedSender<PushMessage>,
}

impl Link {
    /// Create a connected link/peer pair backed by in-process channels.
    pub fn in_memory() -> (Link, LinkPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            Link {
                outbound: out_tx,
                inbound: in_rx,
            },
            LinkPeer {
                outbound: out_rx,
                inbound: in_tx,
            },
        )
    }
}

/// Establishes push connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Link, ChannelError>;

    /// Human-readable endpoint, for logs.
    fn endpoint(&self) -> &str;
}

/// Connects to the backend's task-update WebSocket.
pub struct WsConnector {
    ws_url: String,
}

impl WsConnector {
    /// * `ws_url` - full WebSocket URL, e.g. `ws://host:5000/ws`.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    /// Open the WebSocket and spawn the session task that pumps frames
    /// between the socket and the returned [`Link`].
    ///
    /// A fresh `clientId` (UUID v4) is appended as a query parameter so the
    /// backend can tell reconnects apart.
    async fn connect(&self) -> Result<Link, ChannelError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let separator = if self.ws_url.contains('?') { '&' } else { '?' };
        let url = format!("{}{separator}clientId={client_id}", self.ws_url);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| match e {
            WsError::Http(response) => ChannelError::Protocol(format!(
                "Handshake with {} rejected with status {}",
                self.ws_url,
                response.status()
            )),
            e => ChannelError::Connection(format!("Failed to connect to {}: {e}", self.ws_url)),
        })?;

        tracing::info!(client_id = %client_id, "Connected to push channel at {}", self.ws_url);

        let (link, peer) = Link::in_memory();
        tokio::spawn(run_session(ws_stream, peer, client_id));
        Ok(link)
    }

    fn endpoint(&self) -> &str {
        &self.ws_url
    }
}

/// Errors that can occur when working with the push connection.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Failed to establish the connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server answered the WebSocket handshake with a non-upgrade response.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_link_carries_frames_both_ways() {
        let (mut link, mut peer) = Link::in_memory();

        link.outbound
            .send(ClientMessage::Subscribe("t-1".into()))
            .unwrap();
        assert_eq!(
            peer.outbound.recv().await,
            Some(ClientMessage::Subscribe("t-1".into()))
        );

        drop(peer);
        assert!(link.inbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn ws_connect_to_closed_port_is_a_connection_error() {
        let connector = WsConnector::new("ws://127.0.0.1:9");
        assert_eq!(connector.endpoint(), "ws://127.0.0.1:9");

        let result = connector.connect().await;
        assert!(matches!(result, Err(ChannelError::Connection(_))));
    }

    #[tokio::test]
    async fn rejected_handshake_is_a_protocol_error() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\n\r\n")
                .await;
        });

        let connector = WsConnector::new(format!("ws://{addr}/ws"));
        let result = connector.connect().await;
        assert!(matches!(result, Err(ChannelError::Protocol(_))));
    }
}
