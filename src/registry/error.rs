//! Registry error types
//!
//! Error types for connection and stream registry operations.

use super::key::{ConnectionId, StreamId};

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Stream not found
    StreamNotFound(StreamId),
    /// Connection already has a role
    AlreadyRegistered(ConnectionId),
    /// Connection is not in the registry
    ConnectionNotFound(ConnectionId),
    /// Relay target is missing or its channel is closed
    TargetUnreachable(ConnectionId),
}

impl RegistryError {
    /// Text sent back to the client in an `error` message
    pub fn client_message(&self) -> &'static str {
        match self {
            RegistryError::StreamNotFound(_) => "Stream not found",
            RegistryError::AlreadyRegistered(_) => "Already registered",
            RegistryError::ConnectionNotFound(_) => "Connection not found",
            RegistryError::TargetUnreachable(_) => "Target unreachable",
        }
    }
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::StreamNotFound(id) => write!(f, "Stream not found: {}", id),
            RegistryError::AlreadyRegistered(id) => {
                write!(f, "Connection already registered: {}", id)
            }
            RegistryError::ConnectionNotFound(id) => write!(f, "Connection not found: {}", id),
            RegistryError::TargetUnreachable(id) => write!(f, "Target unreachable: {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}
