//! Stream entry
//!
//! This module defines the per-stream state stored in the registry.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::stats::StreamSummary;

use super::key::{ConnectionId, StreamId};

/// Entry for a single stream in the registry
#[derive(Debug, Clone)]
pub struct StreamEntry {
    /// Stream id (chosen by the streamer)
    pub id: StreamId,

    /// Connection that publishes this stream
    pub streamer_id: ConnectionId,

    /// Viewer connections currently bound to this stream
    pub viewers: HashSet<ConnectionId>,

    /// When the stream was registered
    pub created_at: DateTime<Utc>,
}

impl StreamEntry {
    /// Create a new stream entry with no viewers
    pub fn new(id: StreamId, streamer_id: ConnectionId) -> Self {
        Self {
            id,
            streamer_id,
            viewers: HashSet::new(),
            created_at: Utc::now(),
        }
    }

    /// Start the stream with an existing viewer set
    pub fn with_viewers(mut self, viewers: HashSet<ConnectionId>) -> Self {
        self.viewers = viewers;
        self
    }

    /// Get the number of viewers
    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    /// Whether `id` is the publishing connection
    pub fn is_owned_by(&self, id: &ConnectionId) -> bool {
        &self.streamer_id == id
    }

    /// Listing row for this stream
    pub fn summary(&self) -> StreamSummary {
        StreamSummary {
            id: self.id.clone(),
            streamer_id: self.streamer_id.clone(),
            created_at: self.created_at,
            viewer_count: self.viewer_count(),
        }
    }
}
