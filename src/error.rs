//! Error types
//!
//! The crate-level [`Error`] wraps the per-layer errors: wire protocol,
//! registry and negotiation.

use crate::registry::{ConnectionId, RegistryError};

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket I/O failure
    Io(std::io::Error),
    /// WebSocket handshake or framing failure
    WebSocket(tokio_tungstenite::tungstenite::Error),
    /// Malformed or unexpected message
    Protocol(ProtocolError),
    /// Registry lookup or mutation rejected
    Registry(RegistryError),
    /// Media engine rejected an offer, answer or candidate
    Negotiation(NegotiationError),
    /// WebSocket upgrade did not complete in time
    HandshakeTimeout,
    /// Signaling connection is gone
    ConnectionClosed,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::WebSocket(e) => write!(f, "WebSocket error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
            Error::Negotiation(e) => write!(f, "Negotiation failed: {}", e),
            Error::HandshakeTimeout => write!(f, "WebSocket handshake timed out"),
            Error::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::WebSocket(e) => Some(e),
            Error::Protocol(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::Negotiation(e) => Some(e),
            Error::HandshakeTimeout | Error::ConnectionClosed => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}

impl From<NegotiationError> for Error {
    fn from(e: NegotiationError) -> Self {
        Error::Negotiation(e)
    }
}

/// Wire protocol errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame is not valid JSON
    InvalidJson(String),
    /// JSON object has no string `type` field
    MissingType,
    /// `type` is not one this side understands
    UnknownType(String),
    /// Known `type` but required fields are missing or mistyped
    InvalidFields { kind: String, reason: String },
    /// Offer/answer/candidate payload could not be interpreted
    InvalidPayload(String),
    /// Binary frames are not part of the protocol
    BinaryFrame,
}

impl ProtocolError {
    /// Whether the sender should be told about this error.
    ///
    /// Unknown message types are logged and ignored.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, ProtocolError::UnknownType(_))
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::InvalidJson(reason) => write!(f, "Invalid JSON: {}", reason),
            ProtocolError::MissingType => write!(f, "Missing message type"),
            ProtocolError::UnknownType(kind) => write!(f, "Unknown message type: {}", kind),
            ProtocolError::InvalidFields { kind, reason } => {
                write!(f, "Invalid '{}' message: {}", kind, reason)
            }
            ProtocolError::InvalidPayload(reason) => write!(f, "Invalid payload: {}", reason),
            ProtocolError::BinaryFrame => write!(f, "Binary frames are not supported"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Failures reported by (or around) the media engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// The engine rejected the operation
    Engine(String),
    /// Remote description or candidate payload could not be decoded
    MalformedPayload(String),
    /// No negotiation session exists for this peer
    NoSession(ConnectionId),
}

impl std::fmt::Display for NegotiationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NegotiationError::Engine(reason) => write!(f, "{}", reason),
            NegotiationError::MalformedPayload(reason) => {
                write!(f, "Malformed payload: {}", reason)
            }
            NegotiationError::NoSession(peer) => write!(f, "No session for peer {}", peer),
        }
    }
}

impl std::error::Error for NegotiationError {}

impl From<ProtocolError> for NegotiationError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::InvalidPayload(reason) => NegotiationError::MalformedPayload(reason),
            other => NegotiationError::MalformedPayload(other.to_string()),
        }
    }
}
