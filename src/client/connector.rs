//! WebSocket signaling connector
//!
//! Owns the client socket through two background tasks:
//!
//! ```text
//!   SignalSender ──► unbounded mpsc ──► writer task ──► socket
//!   socket ──► reader task ──► decode ──► mpsc::Receiver<ServerMessage>
//! ```
//!
//! The writer closes the socket once every [`SignalSender`] is dropped. The
//! inbound receiver yields `None` once the server closes the connection.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, ProtocolError, Result};
use crate::protocol::{decode, encode, ClientMessage, ServerMessage};

use super::config::ClientConfig;

/// Fire-and-forget handle for outbound signaling messages
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<ClientMessage>,
}

impl SignalSender {
    /// Wrap an existing channel
    pub fn new(tx: mpsc::UnboundedSender<ClientMessage>) -> Self {
        Self { tx }
    }

    /// Create a sender and the receiver that drains it
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClientMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Queue a message; dropped silently once the connection is gone
    pub fn send(&self, msg: ClientMessage) {
        if self.tx.send(msg).is_err() {
            tracing::debug!("Signaling connection closed, dropping message");
        }
    }

    /// Whether the connection still accepts messages
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Connected signaling client
pub struct SignalingConnector {
    sender: SignalSender,
    inbound: mpsc::Receiver<ServerMessage>,
}

impl SignalingConnector {
    /// Connect to the signaling server
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        tracing::info!(url = %config.server_url, "Connecting to signaling server");

        let (ws, _) = match timeout(
            config.connect_timeout,
            tokio_tungstenite::connect_async(config.server_url.as_str()),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(Error::HandshakeTimeout),
        };

        let (mut sink, mut stream) = ws.split();
        let (sender, mut outbound) = SignalSender::channel();
        let (inbound_tx, inbound) = mpsc::channel(config.inbound_capacity.max(1));

        tokio::spawn(async move {
            while let Some(msg) = outbound.recv().await {
                let frame = match encode(&msg) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::error!(kind = msg.kind(), error = %e, "Failed to encode message");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(frame.into_text())).await {
                    tracing::debug!(error = %e, "Signaling write failed");
                    return;
                }
            }
            let _ = sink.close().await;
            tracing::debug!("Signaling writer finished");
        });

        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let text = match msg {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Binary(_)) => {
                        tracing::warn!(error = %ProtocolError::BinaryFrame, "Ignoring frame");
                        continue;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::debug!(error = %e, "Signaling read failed");
                        break;
                    }
                };

                match decode::<ServerMessage>(&text) {
                    Ok(msg) => {
                        if inbound_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Ignoring server message"),
                }
            }
            tracing::debug!("Signaling reader finished");
        });

        Ok(Self { sender, inbound })
    }

    /// Split into the outbound handle and the inbound message stream
    pub fn into_parts(self) -> (SignalSender, mpsc::Receiver<ServerMessage>) {
        (self.sender, self.inbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_after_close_is_silent() {
        let (sender, rx) = SignalSender::channel();
        assert!(sender.is_open());

        drop(rx);
        assert!(!sender.is_open());
        sender.send(ClientMessage::StopStream);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ClientConfig::new(format!("ws://{}", addr));
        let result = SignalingConnector::connect(&config).await;
        assert!(matches!(result, Err(Error::WebSocket(_))));
    }
}
