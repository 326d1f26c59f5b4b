//! Connection registry
//!
//! Tracks every live signaling connection, its role and the stream it is
//! bound to.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::server::ClientChannel;

use super::error::RegistryError;
use super::key::{ConnectionId, StreamId};

/// Role of a connection, set once at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Connected but not registered yet
    Unassigned,
    /// Publishes a stream
    Streamer,
    /// Watches a stream
    Viewer,
}

/// Entry for a single connection
#[derive(Debug)]
pub struct ConnectionEntry {
    /// Connection id
    pub id: ConnectionId,

    /// Current role
    pub role: Role,

    /// Stream this connection is bound to (None until registration)
    pub stream_id: Option<StreamId>,

    /// Outbound channel to the client
    pub channel: ClientChannel,
}

impl ConnectionEntry {
    fn new(id: ConnectionId, channel: ClientChannel) -> Self {
        Self {
            id,
            role: Role::Unassigned,
            stream_id: None,
            channel,
        }
    }

    /// Whether this connection is a viewer bound to `stream_id`
    pub fn is_viewer_of(&self, stream_id: &StreamId) -> bool {
        self.role == Role::Viewer && self.stream_id.as_ref() == Some(stream_id)
    }
}

/// All live connections, keyed by id
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a freshly accepted, unassigned connection
    pub fn insert(&mut self, id: ConnectionId, channel: ClientChannel) {
        self.connections
            .insert(id.clone(), ConnectionEntry::new(id, channel));
    }

    /// Look up a connection
    pub fn get(&self, id: &ConnectionId) -> Option<&ConnectionEntry> {
        self.connections.get(id)
    }

    /// Remove a connection, returning its entry
    pub fn remove(&mut self, id: &ConnectionId) -> Option<ConnectionEntry> {
        self.connections.remove(id)
    }

    /// Give an unassigned connection its role and stream binding
    ///
    /// Roles never change once assigned.
    pub fn assign(
        &mut self,
        id: &ConnectionId,
        role: Role,
        stream_id: StreamId,
    ) -> Result<(), RegistryError> {
        let entry = self
            .connections
            .get_mut(id)
            .ok_or_else(|| RegistryError::ConnectionNotFound(id.clone()))?;

        if entry.role != Role::Unassigned {
            return Err(RegistryError::AlreadyRegistered(id.clone()));
        }

        entry.role = role;
        entry.stream_id = Some(stream_id);
        Ok(())
    }

    /// Channel of a connection that can still receive frames
    pub fn reachable(&self, id: &ConnectionId) -> Result<&ClientChannel, RegistryError> {
        self.connections
            .get(id)
            .map(|entry| &entry.channel)
            .filter(|channel| channel.is_open())
            .ok_or_else(|| RegistryError::TargetUnreachable(id.clone()))
    }

    /// Every live viewer bound to `stream_id`
    pub fn viewers_bound_to(&self, stream_id: &StreamId) -> HashSet<ConnectionId> {
        self.connections
            .values()
            .filter(|entry| entry.is_viewer_of(stream_id) && entry.channel.is_open())
            .map(|entry| entry.id.clone())
            .collect()
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether there are no connections
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
