//! Viewer-side negotiation driver
//!
//! Watches one stream. Each offer from the streamer starts a fresh peer
//! session, replacing whatever session existed before:
//!
//! ```text
//!   connected      ──► register-viewer{streamId}
//!   offer          ──► create peer, set remote, create + set answer
//!                      ──► answer{targetId: streamer}
//!   ice-candidate  ──► add remote candidate (buffered until the offer is applied)
//!   stream-ended   ──► close the session, wait for a new offer
//! ```

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, NegotiationError, Result};
use crate::media::{MediaEngine, PeerEvent, PeerEventKind, PeerEventSink, PeerRole, PeerState, RemoteTrack};
use crate::protocol::{ClientMessage, IceCandidate, SdpType, ServerMessage, SessionDescription};
use crate::registry::{ConnectionId, StreamId};
use crate::session::{NegotiationPhase, SessionTable};

use super::config::ClientConfig;
use super::connector::SignalSender;
use super::negotiation::{candidate_message, emit, spawn_negotiation, Negotiated};

/// Events from the viewer driver
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    /// Signaling connection accepted
    Connected { client_id: ConnectionId },

    /// Registered; waiting for the streamer's offer
    Waiting { stream_id: StreamId },

    /// Offer received, answering
    Connecting { streamer_id: ConnectionId },

    /// A new remote media stream arrived; attach it to a render sink
    RemoteTrack(RemoteTrack),

    /// Connectivity of the peer changed
    PeerState(PeerState),

    /// The engine rejected the offer or a candidate
    NegotiationFailed { reason: String },

    /// The streamer stopped
    Ended,

    /// Server reported an error, e.g. an unknown stream
    ServerError { message: String },

    /// Driver stopped and the peer was closed
    Closed,
}

/// Viewer negotiation driver
pub struct Viewer<E: MediaEngine> {
    engine: Arc<E>,
    signal: SignalSender,
    stream_id: StreamId,
    sessions: SessionTable<E::Peer>,
    events: mpsc::Sender<ViewerEvent>,
    peer_tx: mpsc::UnboundedSender<PeerEvent>,
    peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
    done_tx: mpsc::UnboundedSender<Negotiated<E::Peer>>,
    done_rx: mpsc::UnboundedReceiver<Negotiated<E::Peer>>,
}

impl<E: MediaEngine> Viewer<E> {
    /// Create a driver for `config.stream_id`.
    ///
    /// Returns the driver and a receiver for events.
    pub fn new(
        engine: Arc<E>,
        signal: SignalSender,
        config: &ClientConfig,
    ) -> (Self, mpsc::Receiver<ViewerEvent>) {
        let (events, rx) = mpsc::channel(config.event_capacity.max(1));
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let viewer = Self {
            engine,
            signal,
            stream_id: StreamId::new(config.stream_id.clone().unwrap_or_default()),
            sessions: SessionTable::new(),
            events,
            peer_tx,
            peer_rx,
            done_tx,
            done_rx,
        };

        (viewer, rx)
    }

    /// Drive negotiation until `shutdown` fires or the signaling connection
    /// closes. The peer is closed before this returns.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<ServerMessage>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let result = loop {
            tokio::select! {
                _ = shutdown.cancelled() => break Ok(()),
                msg = inbound.recv() => match msg {
                    Some(msg) => self.handle_message(msg).await,
                    None => break Err(Error::ConnectionClosed),
                },
                Some(done) = self.done_rx.recv() => self.on_answer_ready(done).await,
                Some(event) = self.peer_rx.recv() => self.on_peer_event(event),
            }
        };

        self.sessions.close_all();
        emit(&self.events, ViewerEvent::Closed);
        result
    }

    async fn handle_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Connected { client_id } => {
                tracing::info!(client_id = %client_id, stream = %self.stream_id, "Connected, joining stream");
                self.signal.send(ClientMessage::RegisterViewer {
                    stream_id: Some(self.stream_id.clone()),
                });
                emit(&self.events, ViewerEvent::Connected { client_id });
            }
            ServerMessage::Registered { stream_id, .. } => {
                emit(&self.events, ViewerEvent::Waiting { stream_id });
            }
            ServerMessage::Offer { offer, sender_id } => self.on_offer(sender_id, offer),
            ServerMessage::IceCandidate {
                candidate,
                sender_id,
            } => self.on_remote_candidate(sender_id, candidate).await,
            ServerMessage::StreamEnded => {
                tracing::info!(stream = %self.stream_id, "Stream ended");
                self.sessions.close_all();
                emit(&self.events, ViewerEvent::Ended);
            }
            ServerMessage::Error { message } => {
                tracing::warn!(message = %message, "Server error");
                emit(&self.events, ViewerEvent::ServerError { message });
            }
            other => {
                tracing::debug!(kind = other.kind(), "Ignoring message");
            }
        }
    }

    fn on_offer(&mut self, streamer_id: ConnectionId, payload: Value) {
        let description = match SessionDescription::from_payload(&payload, SdpType::Offer) {
            Ok(description) => description,
            Err(e) => return self.fail(e.into()),
        };

        // One stream, one streamer: any earlier session is obsolete
        self.sessions.close_all();

        let session = self.sessions.begin(streamer_id.clone());
        session.transition(NegotiationPhase::OfferReceived);
        let sink = PeerEventSink::new(streamer_id.clone(), session.generation, self.peer_tx.clone());

        tracing::info!(streamer = %streamer_id, generation = session.generation, "Offer received, answering");

        spawn_negotiation(
            Arc::clone(&self.engine),
            PeerRole::Answerer,
            sink,
            session.cancel_token(),
            Some(description),
            self.done_tx.clone(),
        );

        emit(&self.events, ViewerEvent::Connecting { streamer_id });
    }

    async fn on_answer_ready(&mut self, done: Negotiated<E::Peer>) {
        let Some(session) = self.sessions.current_mut(&done.peer_id, done.generation) else {
            tracing::debug!(
                streamer = %done.peer_id,
                generation = done.generation,
                "Discarding stale answer"
            );
            done.discard();
            return;
        };

        let streamer_id = done.peer_id;
        match done.result {
            Ok((peer, answer)) => {
                session.attach_peer(peer);
                session.mark_remote_description_set();

                self.signal.send(ClientMessage::Answer {
                    answer: answer.to_payload(),
                    target_id: streamer_id.clone(),
                });
                session.transition(NegotiationPhase::AnswerSent);

                for candidate in session.mark_local_description_sent() {
                    self.signal.send(candidate_message(&candidate, &streamer_id));
                }

                let flushed = session.flush_pending_candidates().await;
                tracing::debug!(streamer = %streamer_id, flushed = flushed, "Answer sent");
            }
            Err(e) => self.fail(e),
        }
    }

    async fn on_remote_candidate(&mut self, streamer_id: ConnectionId, payload: Value) {
        let candidate = match IceCandidate::from_payload(&payload) {
            Ok(candidate) => candidate,
            Err(e) => return self.fail(e.into()),
        };

        let Some(session) = self.sessions.get_mut(&streamer_id) else {
            tracing::debug!(streamer = %streamer_id, "Candidate without a session, dropping");
            return;
        };

        if let Err(e) = session.add_remote_candidate(candidate).await {
            self.fail(e);
        }
    }

    fn on_peer_event(&mut self, event: PeerEvent) {
        let Some(session) = self.sessions.current_mut(&event.peer_id, event.generation) else {
            tracing::trace!(streamer = %event.peer_id, "Ignoring event from stale peer");
            return;
        };

        match event.kind {
            PeerEventKind::LocalCandidate(candidate) => {
                if let Some(candidate) = session.local_candidate(candidate) {
                    self.signal.send(candidate_message(&candidate, &event.peer_id));
                }
            }
            PeerEventKind::RemoteTrack(track) => {
                if session.attach_stream(&track.stream_id) {
                    tracing::info!(stream = %track.stream_id, kind = ?track.kind, "Remote stream attached");
                    emit(&self.events, ViewerEvent::RemoteTrack(track));
                }
            }
            PeerEventKind::StateChanged(state) => {
                if state == PeerState::Connected {
                    session.transition(NegotiationPhase::Connected);
                }
                tracing::debug!(streamer = %event.peer_id, state = ?state, "Peer state changed");
                emit(&self.events, ViewerEvent::PeerState(state));
            }
        }
    }

    fn fail(&self, error: NegotiationError) {
        tracing::warn!(error = %error, "Negotiation failed");
        emit(
            &self.events,
            ViewerEvent::NegotiationFailed {
                reason: error.to_string(),
            },
        );
    }
}
