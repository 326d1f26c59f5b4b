//! Negotiation state machine
//!
//! Tracks one offer/answer exchange with one remote endpoint, from the
//! triggering message to teardown.
//!
//! ```text
//!  streamer:  Idle ──► OfferCreated ──► AnswerPending ──► Connected ──► Closed
//!  viewer:    Idle ──► OfferReceived ──► AnswerSent ────► Connected ──► Closed
//! ```
//!
//! Every session carries a generation number and a cancellation token. A new
//! trigger for the same remote endpoint cancels the old token and bumps the
//! generation, so late results from the superseded session are recognized and
//! discarded instead of applied.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::error::NegotiationError;
use crate::media::PeerConnection;
use crate::protocol::{IceCandidate, SessionDescription};
use crate::registry::ConnectionId;

/// Negotiation lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationPhase {
    /// Session created, nothing exchanged yet
    Idle,
    /// Local offer created and applied
    OfferCreated,
    /// Offer sent, waiting for the answer or for connectivity
    AnswerPending,
    /// Remote offer received, answer being created
    OfferReceived,
    /// Answer sent, waiting for connectivity
    AnswerSent,
    /// Engine reported the peer connected
    Connected,
    /// Session torn down
    Closed,
}

/// What happened to a remote candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateDisposition {
    /// Held until the remote description is applied
    Buffered,
    /// Handed to the engine
    Applied,
}

/// Negotiation state for one remote endpoint
#[derive(Debug)]
pub struct PeerSession<P: PeerConnection> {
    /// Remote endpoint
    pub peer_id: ConnectionId,

    /// Generation this session was created with
    pub generation: u64,

    phase: NegotiationPhase,
    peer: Option<P>,
    cancel: CancellationToken,
    remote_description_set: bool,
    local_description_sent: bool,

    /// Remote candidates received before the remote description was applied
    pending_remote: Vec<IceCandidate>,

    /// Local candidates gathered before our description went out
    pending_local: Vec<IceCandidate>,

    /// Remote media streams already surfaced
    attached_streams: HashSet<String>,

    /// When the session started
    pub started_at: Instant,
}

impl<P: PeerConnection> PeerSession<P> {
    /// Create an idle session
    pub fn new(peer_id: ConnectionId, generation: u64) -> Self {
        Self {
            peer_id,
            generation,
            phase: NegotiationPhase::Idle,
            peer: None,
            cancel: CancellationToken::new(),
            remote_description_set: false,
            local_description_sent: false,
            pending_remote: Vec::new(),
            pending_local: Vec::new(),
            attached_streams: HashSet::new(),
            started_at: Instant::now(),
        }
    }

    /// Current phase
    pub fn phase(&self) -> NegotiationPhase {
        self.phase
    }

    /// Move to `phase`; a closed session stays closed
    pub fn transition(&mut self, phase: NegotiationPhase) {
        if self.phase != NegotiationPhase::Closed {
            self.phase = phase;
        }
    }

    /// Token that is cancelled when this session is superseded or closed
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Take ownership of the engine peer created for this session
    pub fn attach_peer(&mut self, peer: P) {
        if let Some(mut old) = self.peer.replace(peer) {
            old.close();
        }
    }

    /// Engine peer, once created
    pub fn peer_mut(&mut self) -> Option<&mut P> {
        self.peer.as_mut()
    }

    /// Whether the remote description has been applied
    pub fn remote_description_set(&self) -> bool {
        self.remote_description_set
    }

    /// Apply the remote description, then every buffered remote candidate
    ///
    /// Returns the number of buffered candidates applied.
    pub async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<usize, NegotiationError> {
        let peer = self
            .peer
            .as_mut()
            .ok_or_else(|| NegotiationError::NoSession(self.peer_id.clone()))?;

        peer.set_remote_description(description).await?;
        self.mark_remote_description_set();

        Ok(self.flush_pending_candidates().await)
    }

    /// Record that the remote description was applied elsewhere
    pub fn mark_remote_description_set(&mut self) {
        self.remote_description_set = true;
    }

    /// Apply a remote candidate, or buffer it until the remote description is set
    pub async fn add_remote_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<CandidateDisposition, NegotiationError> {
        match self.peer.as_mut() {
            Some(peer) if self.remote_description_set => {
                peer.add_remote_candidate(candidate).await?;
                Ok(CandidateDisposition::Applied)
            }
            _ => {
                self.pending_remote.push(candidate);
                Ok(CandidateDisposition::Buffered)
            }
        }
    }

    /// Apply buffered remote candidates in arrival order
    ///
    /// Candidates the engine rejects are logged and skipped. Returns the number
    /// applied.
    pub async fn flush_pending_candidates(&mut self) -> usize {
        let Some(peer) = self.peer.as_mut() else {
            return 0;
        };

        let mut applied = 0;
        for candidate in std::mem::take(&mut self.pending_remote) {
            match peer.add_remote_candidate(candidate).await {
                Ok(()) => applied += 1,
                Err(e) => tracing::warn!(
                    peer = %self.peer_id,
                    error = %e,
                    "Buffered candidate rejected"
                ),
            }
        }
        applied
    }

    /// Number of buffered remote candidates
    pub fn pending_candidates(&self) -> usize {
        self.pending_remote.len()
    }

    /// Route a gathered local candidate
    ///
    /// Returns it when it can be sent now; otherwise it is held until
    /// [`mark_local_description_sent`](Self::mark_local_description_sent).
    pub fn local_candidate(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        if self.local_description_sent {
            Some(candidate)
        } else {
            self.pending_local.push(candidate);
            None
        }
    }

    /// Record that our description went out; returns the held local candidates
    pub fn mark_local_description_sent(&mut self) -> Vec<IceCandidate> {
        self.local_description_sent = true;
        std::mem::take(&mut self.pending_local)
    }

    /// Remember a remote media stream; true the first time it is seen
    pub fn attach_stream(&mut self, stream_id: &str) -> bool {
        self.attached_streams.insert(stream_id.to_owned())
    }

    /// Whether the session has been torn down
    pub fn is_closed(&self) -> bool {
        self.phase == NegotiationPhase::Closed
    }

    /// Cancel in-flight work and close the engine peer
    pub fn close(&mut self) {
        self.cancel.cancel();
        if let Some(mut peer) = self.peer.take() {
            peer.close();
        }
        self.pending_remote.clear();
        self.pending_local.clear();
        self.phase = NegotiationPhase::Closed;
    }
}

impl<P: PeerConnection> Drop for PeerSession<P> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sessions keyed by remote endpoint
#[derive(Debug)]
pub struct SessionTable<P: PeerConnection> {
    sessions: HashMap<ConnectionId, PeerSession<P>>,
    next_generation: u64,
}

impl<P: PeerConnection> SessionTable<P> {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            next_generation: 1,
        }
    }

    /// Start a fresh session for `peer_id`, closing any previous one
    pub fn begin(&mut self, peer_id: ConnectionId) -> &mut PeerSession<P> {
        let generation = self.next_generation;
        self.next_generation += 1;

        if let Some(mut previous) = self.sessions.remove(&peer_id) {
            tracing::debug!(
                peer = %peer_id,
                superseded = previous.generation,
                generation = generation,
                "Superseding negotiation session"
            );
            previous.close();
        }

        self.sessions
            .entry(peer_id.clone())
            .or_insert_with(|| PeerSession::new(peer_id, generation))
    }

    /// Session for `peer_id`, whatever its generation
    pub fn get_mut(&mut self, peer_id: &ConnectionId) -> Option<&mut PeerSession<P>> {
        self.sessions.get_mut(peer_id)
    }

    /// Session for `peer_id` only if it is still at `generation`
    pub fn current_mut(
        &mut self,
        peer_id: &ConnectionId,
        generation: u64,
    ) -> Option<&mut PeerSession<P>> {
        self.sessions
            .get_mut(peer_id)
            .filter(|session| session.generation == generation && !session.is_closed())
    }

    /// Close and forget the session for `peer_id`
    pub fn close(&mut self, peer_id: &ConnectionId) -> bool {
        match self.sessions.remove(peer_id) {
            Some(mut session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    /// Close and forget every session
    pub fn close_all(&mut self) {
        for (_, mut session) in self.sessions.drain() {
            session.close();
        }
    }

    /// Number of sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether there are no sessions
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<P: PeerConnection> Default for SessionTable<P> {
    fn default() -> Self {
        Self::new()
    }
}
