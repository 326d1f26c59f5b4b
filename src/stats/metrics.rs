//! Statistics and metrics for the signaling server

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::registry::{ConnectionId, StreamId};

/// Server-wide health snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStats {
    /// Current live connections (registered or not)
    pub active_clients: usize,
    /// Current active streams
    pub active_streams: usize,
}

/// One row of the stream listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSummary {
    /// Stream id
    pub id: StreamId,
    /// Publishing connection
    pub streamer_id: ConnectionId,
    /// When the stream was registered
    pub created_at: DateTime<Utc>,
    /// Number of viewers bound to the stream
    pub viewer_count: usize,
}

/// Relay counters, updated lock-free by the mediator
#[derive(Debug)]
pub struct RelayMetrics {
    started_at: Instant,
    relayed: AtomicU64,
    dropped: AtomicU64,
    malformed: AtomicU64,
    overflowed: AtomicU64,
}

impl RelayMetrics {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            relayed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            overflowed: AtomicU64::new(0),
        }
    }

    /// An offer/answer/candidate reached its target's queue
    pub fn record_relayed(&self) {
        self.relayed.fetch_add(1, Ordering::Relaxed);
    }

    /// A relay target was missing or closed
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// An inbound frame could not be decoded
    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// A client's outbound queue was full
    pub fn record_overflow(&self) {
        self.overflowed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> RelaySnapshot {
        RelaySnapshot {
            uptime: self.started_at.elapsed(),
            relayed: self.relayed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            overflowed: self.overflowed.load(Ordering::Relaxed),
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy of [`RelayMetrics`] at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySnapshot {
    /// Time since the mediator was created
    pub uptime: Duration,
    /// Messages delivered to a relay target
    pub relayed: u64,
    /// Messages dropped because the target was unreachable
    pub dropped: u64,
    /// Inbound frames rejected as malformed
    pub malformed: u64,
    /// Frames dropped because a client's queue was full
    pub overflowed: u64,
}

impl RelaySnapshot {
    /// Share of relay attempts that were dropped, in `[0, 1]`
    pub fn drop_ratio(&self) -> f64 {
        let attempts = self.relayed + self.dropped;
        if attempts > 0 {
            self.dropped as f64 / attempts as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_relay_metrics_counts() {
        let metrics = RelayMetrics::new();
        metrics.record_relayed();
        metrics.record_relayed();
        metrics.record_relayed();
        metrics.record_dropped();
        metrics.record_malformed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.relayed, 3);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.malformed, 1);
        assert_eq!(snapshot.overflowed, 0);
        assert_eq!(snapshot.drop_ratio(), 0.25);
    }

    #[test]
    fn test_drop_ratio_without_traffic() {
        assert_eq!(RelaySnapshot::default().drop_ratio(), 0.0);
    }

    #[test]
    fn test_summary_serializes_like_listing() {
        let row = StreamSummary {
            id: StreamId::new("cam-1"),
            streamer_id: ConnectionId::new("s1"),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            viewer_count: 2,
        };

        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            serde_json::json!({
                "id": "cam-1",
                "streamerId": "s1",
                "createdAt": "2024-05-01T12:00:00Z",
                "viewerCount": 2,
            })
        );
    }

    #[test]
    fn test_server_stats_shape() {
        let stats = ServerStats {
            active_clients: 3,
            active_streams: 1,
        };
        assert_eq!(
            serde_json::to_value(&stats).unwrap(),
            serde_json::json!({"activeClients": 3, "activeStreams": 1})
        );
    }
}
