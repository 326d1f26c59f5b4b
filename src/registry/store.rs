//! Stream registry implementation
//!
//! Maps stream ids to their streamer and viewer set. Not synchronized on its
//! own: the mediator mutates it together with the connection registry under a
//! single lock.

use std::collections::HashMap;

use crate::stats::StreamSummary;

use super::entry::StreamEntry;
use super::error::RegistryError;
use super::key::{ConnectionId, StreamId};

/// Registry of all active streams
#[derive(Debug, Default)]
pub struct StreamRegistry {
    /// Map of stream id to stream entry
    streams: HashMap<StreamId, StreamEntry>,
}

impl StreamRegistry {
    /// Create an empty stream registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a stream, replacing any entry under the same id
    ///
    /// Returns the replaced entry.
    pub fn insert(&mut self, entry: StreamEntry) -> Option<StreamEntry> {
        let replaced = self.streams.insert(entry.id.clone(), entry);

        if let Some(ref old) = replaced {
            tracing::debug!(
                stream = %old.id,
                previous_streamer = %old.streamer_id,
                viewers = old.viewer_count(),
                "Stream entry replaced"
            );
        }

        replaced
    }

    /// Look up a stream
    pub fn get(&self, id: &StreamId) -> Option<&StreamEntry> {
        self.streams.get(id)
    }

    /// Check if a stream exists
    pub fn contains(&self, id: &StreamId) -> bool {
        self.streams.contains_key(id)
    }

    /// Remove a stream only if `streamer_id` still owns it
    pub fn remove_owned(&mut self, id: &StreamId, streamer_id: &ConnectionId) -> Option<StreamEntry> {
        match self.streams.get(id) {
            Some(entry) if entry.is_owned_by(streamer_id) => self.streams.remove(id),
            Some(entry) => {
                tracing::warn!(
                    stream = %id,
                    owner = %entry.streamer_id,
                    caller = %streamer_id,
                    "Stream owner mismatch, not removing"
                );
                None
            }
            None => None,
        }
    }

    /// Add a viewer to a stream
    ///
    /// Returns the streamer's connection id.
    pub fn add_viewer(
        &mut self,
        id: &StreamId,
        viewer: ConnectionId,
    ) -> Result<ConnectionId, RegistryError> {
        let entry = self
            .streams
            .get_mut(id)
            .ok_or_else(|| RegistryError::StreamNotFound(id.clone()))?;

        entry.viewers.insert(viewer);

        tracing::info!(
            stream = %id,
            viewers = entry.viewer_count(),
            "Viewer added"
        );

        Ok(entry.streamer_id.clone())
    }

    /// Remove a viewer from a stream
    ///
    /// Returns the streamer's connection id if the viewer was a member.
    pub fn remove_viewer(&mut self, id: &StreamId, viewer: &ConnectionId) -> Option<ConnectionId> {
        let entry = self.streams.get_mut(id)?;

        if !entry.viewers.remove(viewer) {
            return None;
        }

        tracing::debug!(
            stream = %id,
            viewers = entry.viewer_count(),
            "Viewer removed"
        );

        Some(entry.streamer_id.clone())
    }

    /// Listing rows for every stream, oldest first
    pub fn summaries(&self) -> Vec<StreamSummary> {
        let mut rows: Vec<StreamSummary> = self.streams.values().map(StreamEntry::summary).collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        rows
    }

    /// Get total number of streams
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Whether there are no streams
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn cam() -> StreamId {
        StreamId::new("cam-1")
    }

    #[test]
    fn test_insert_and_replace() {
        let mut registry = StreamRegistry::new();

        assert!(registry
            .insert(StreamEntry::new(cam(), ConnectionId::new("s1")))
            .is_none());
        assert!(registry.contains(&cam()));

        let replaced = registry
            .insert(StreamEntry::new(cam(), ConnectionId::new("s2")))
            .unwrap();
        assert_eq!(replaced.streamer_id, ConnectionId::new("s1"));

        // Exactly one stream per id
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(&cam()).unwrap().streamer_id,
            ConnectionId::new("s2")
        );
    }

    #[test]
    fn test_add_viewer() {
        let mut registry = StreamRegistry::new();
        registry.insert(StreamEntry::new(cam(), ConnectionId::new("s1")));

        let streamer = registry.add_viewer(&cam(), ConnectionId::new("v1")).unwrap();
        assert_eq!(streamer, ConnectionId::new("s1"));
        assert_eq!(registry.get(&cam()).unwrap().viewer_count(), 1);

        let missing = StreamId::new("missing");
        let result = registry.add_viewer(&missing, ConnectionId::new("v2"));
        assert_eq!(result, Err(RegistryError::StreamNotFound(missing)));
    }

    #[test]
    fn test_remove_viewer() {
        let mut registry = StreamRegistry::new();
        registry.insert(StreamEntry::new(cam(), ConnectionId::new("s1")));
        registry.add_viewer(&cam(), ConnectionId::new("v1")).unwrap();

        assert_eq!(
            registry.remove_viewer(&cam(), &ConnectionId::new("v1")),
            Some(ConnectionId::new("s1"))
        );
        // Second removal is a no-op
        assert_eq!(registry.remove_viewer(&cam(), &ConnectionId::new("v1")), None);

        // Stream survives with no viewers
        assert!(registry.contains(&cam()));
    }

    #[test]
    fn test_remove_owned() {
        let mut registry = StreamRegistry::new();
        registry.insert(StreamEntry::new(cam(), ConnectionId::new("s2")));

        assert!(registry
            .remove_owned(&cam(), &ConnectionId::new("s1"))
            .is_none());
        assert!(registry.contains(&cam()));

        assert!(registry
            .remove_owned(&cam(), &ConnectionId::new("s2"))
            .is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_summaries() {
        let mut registry = StreamRegistry::new();
        let viewers: HashSet<ConnectionId> =
            ["v1", "v2"].into_iter().map(ConnectionId::new).collect();
        registry.insert(StreamEntry::new(cam(), ConnectionId::new("s1")).with_viewers(viewers));

        let rows = registry.summaries();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, cam());
        assert_eq!(rows[0].viewer_count, 2);
    }
}
