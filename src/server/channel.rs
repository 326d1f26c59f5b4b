//! Outbound half of a client connection
//!
//! The mediator never writes to sockets directly. Each connection owns a
//! bounded queue drained by its writer task; sends are `try_send`, so a slow
//! or dead client only loses its own frames and never stalls the caller.

use tokio::sync::mpsc;

use crate::protocol::OutboundFrame;

/// Result of a non-blocking send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Frame queued for the writer task
    Queued,
    /// Queue full, frame dropped
    Overflow,
    /// Writer is gone, frame dropped
    Closed,
}

/// Fire-and-forget handle to one client's writer task
#[derive(Debug, Clone)]
pub struct ClientChannel {
    tx: mpsc::Sender<OutboundFrame>,
}

impl ClientChannel {
    /// Wrap an existing sender
    pub fn new(tx: mpsc::Sender<OutboundFrame>) -> Self {
        Self { tx }
    }

    /// Create a channel and the receiver its writer task drains
    pub fn pair(capacity: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Queue a frame without waiting
    pub fn send(&self, frame: OutboundFrame) -> Delivery {
        match self.tx.try_send(frame) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Overflow,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Whether the writer task is still accepting frames
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}
