//! Per-connection handling
//!
//! Each accepted socket is upgraded to a WebSocket and split in two halves:
//!
//! ```text
//!   socket ──read──► Connection::read_loop ──► Mediator ──► ClientChannel(s)
//!   socket ◄─write── writer task ◄── mpsc ◄── ClientChannel
//! ```
//!
//! The read half runs in the connection task and feeds the mediator in
//! arrival order. The write half drains the connection's outbound queue.
//! When the read half ends, for whatever reason, the mediator's disconnect
//! path runs before the task exits.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ProtocolError, Result};
use crate::protocol::OutboundFrame;
use crate::registry::ConnectionId;

use super::channel::ClientChannel;
use super::config::ServerConfig;
use super::mediator::Mediator;

/// How long the writer may keep flushing after the client is gone
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<TcpStream>;

/// One signaling connection
pub struct Connection {
    peer_addr: SocketAddr,
    config: ServerConfig,
    mediator: Arc<Mediator>,
    shutdown: CancellationToken,
}

impl Connection {
    /// Create a connection handler
    pub fn new(
        peer_addr: SocketAddr,
        config: ServerConfig,
        mediator: Arc<Mediator>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            peer_addr,
            config,
            mediator,
            shutdown,
        }
    }

    /// Upgrade the socket and serve it until either side closes
    pub async fn run(self, socket: TcpStream) -> Result<()> {
        let ws = match timeout(
            self.config.handshake_timeout,
            tokio_tungstenite::accept_async(socket),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(Error::HandshakeTimeout),
        };

        let (sink, mut stream) = ws.split();
        let (channel, rx) = ClientChannel::pair(self.config.outbound_queue_capacity);
        let mut writer = spawn_writer(sink, rx);

        let id = self.mediator.accept(channel).await;
        tracing::debug!(client_id = %id, peer = %self.peer_addr, "WebSocket established");

        let result = self.read_loop(&id, &mut stream).await;

        // Dropping the registry entry drops the last sender, ending the writer
        self.mediator.disconnect(&id).await;

        match timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(client_id = %id, error = %e, "Writer task failed"),
            Err(_) => {
                tracing::debug!(client_id = %id, "Writer did not drain in time");
                writer.abort();
            }
        }

        result
    }

    async fn read_loop(&self, id: &ConnectionId, stream: &mut SplitStream<WsStream>) -> Result<()> {
        loop {
            let msg = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::debug!(client_id = %id, "Closing on shutdown");
                    return Ok(());
                }
                msg = stream.next() => msg,
            };

            let Some(msg) = msg else {
                return Ok(());
            };

            match msg? {
                Message::Text(text) => self.mediator.handle_text(id, &text).await,
                Message::Binary(_) => {
                    self.mediator
                        .reject(id, ProtocolError::BinaryFrame)
                        .await
                }
                Message::Close(_) => return Ok(()),
                // Pings are answered by tungstenite on the next write
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }
}

fn spawn_writer(
    mut sink: futures_util::stream::SplitSink<WsStream, Message>,
    mut rx: tokio::sync::mpsc::Receiver<OutboundFrame>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sink.send(Message::Text(frame.into_text())).await {
                tracing::debug!(error = %e, "Write failed, dropping outbound queue");
                return;
            }
        }

        let _ = sink.close().await;
    })
}
