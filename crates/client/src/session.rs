//! WebSocket session pump.
//!
//! Bridges one live WebSocket to a [`LinkPeer`]: outbound
//! [`ClientMessage`]s become JSON text frames, inbound text frames are
//! parsed into [`PushMessage`]s. The session ends when either side goes
//! away; dropping the peer is what tells the channel the socket is gone.

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::client::LinkPeer;
use crate::messages::parse_message;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Drive a single WebSocket session until the socket or the link closes.
pub(crate) async fn run_session(ws_stream: WsStream, mut peer: LinkPeer, client_id: String) {
    let (mut sink, mut stream) = ws_stream.split();

    loop {
        tokio::select! {
            outgoing = peer.outbound.recv() => {
                let Some(message) = outgoing else {
                    tracing::debug!(client_id = %client_id, "Link dropped, closing WebSocket");
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                if let Err(e) = sink.send(Message::Text(message.to_json())).await {
                    tracing::error!(client_id = %client_id, error = %e, "Failed to send frame");
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => handle_text_message(&peer, &client_id, &text),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Handled automatically by tungstenite.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(client_id = %client_id, ?frame, "Push channel closed by backend");
                        break;
                    }
                    Some(Ok(_)) => {
                        tracing::trace!(client_id = %client_id, "Ignoring non-text frame");
                    }
                    Some(Err(e)) => {
                        tracing::error!(client_id = %client_id, error = %e, "WebSocket receive error");
                        break;
                    }
                    None => {
                        tracing::info!(client_id = %client_id, "WebSocket stream exhausted");
                        break;
                    }
                }
            }
        }
    }
}

fn handle_text_message(peer: &LinkPeer, client_id: &str, text: &str) {
    match parse_message(text) {
        Ok(message) => {
            // A send error means the channel already dropped the link.
            let _ = peer.inbound.send(message);
        }
        Err(e) => {
            tracing::warn!(
                client_id = %client_id,
                error = %e,
                raw_message = %text,
                "Failed to parse push frame",
            );
        }
    }
}
