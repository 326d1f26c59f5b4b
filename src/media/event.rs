//! Peer events
//!
//! Engine callbacks are turned into [`PeerEvent`]s on a channel the driver
//! loop owns. Each event carries the peer id and session generation it was
//! created for, so events from a superseded session can be told apart and
//! dropped.

use tokio::sync::mpsc;

use crate::protocol::IceCandidate;
use crate::registry::ConnectionId;

/// Connectivity state reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerState {
    /// Whether the peer can no longer carry media without renegotiation
    pub fn is_terminal(&self) -> bool {
        matches!(self, PeerState::Failed | PeerState::Closed)
    }
}

/// Kind of a remote media track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A remote track arriving on a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    /// Remote media stream the track belongs to
    pub stream_id: String,
    /// Track id within the stream
    pub track_id: String,
    /// Audio or video
    pub kind: TrackKind,
}

/// What happened on a peer
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEventKind {
    /// The engine gathered a local candidate
    LocalCandidate(IceCandidate),
    /// A remote track started
    RemoteTrack(RemoteTrack),
    /// Connectivity state changed
    StateChanged(PeerState),
}

/// Event tagged with its originating session
#[derive(Debug, Clone, PartialEq)]
pub struct PeerEvent {
    /// Remote endpoint the peer talks to
    pub peer_id: ConnectionId,
    /// Session generation the peer was created for
    pub generation: u64,
    /// Payload
    pub kind: PeerEventKind,
}

/// Handle engines use to report peer events
///
/// Sending never blocks and is silently dropped once the driver is gone.
#[derive(Debug, Clone)]
pub struct PeerEventSink {
    peer_id: ConnectionId,
    generation: u64,
    tx: mpsc::UnboundedSender<PeerEvent>,
}

impl PeerEventSink {
    /// Create a sink for one peer session
    pub fn new(peer_id: ConnectionId, generation: u64, tx: mpsc::UnboundedSender<PeerEvent>) -> Self {
        Self {
            peer_id,
            generation,
            tx,
        }
    }

    /// Remote endpoint this sink reports for
    pub fn peer_id(&self) -> &ConnectionId {
        &self.peer_id
    }

    /// Session generation this sink reports for
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report a gathered local candidate
    pub fn local_candidate(&self, candidate: IceCandidate) {
        self.emit(PeerEventKind::LocalCandidate(candidate));
    }

    /// Report a remote track
    pub fn remote_track(&self, track: RemoteTrack) {
        self.emit(PeerEventKind::RemoteTrack(track));
    }

    /// Report a connectivity state change
    pub fn state_changed(&self, state: PeerState) {
        self.emit(PeerEventKind::StateChanged(state));
    }

    fn emit(&self, kind: PeerEventKind) {
        let _ = self.tx.send(PeerEvent {
            peer_id: self.peer_id.clone(),
            generation: self.generation,
            kind,
        });
    }
}
