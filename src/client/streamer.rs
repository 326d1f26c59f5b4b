//! Streamer-side negotiation driver
//!
//! Publishes the local tracks under a stream id and negotiates one
//! independent peer session per viewer:
//!
//! ```text
//!   connected      ──► register-streamer
//!   viewer-joined  ──► create peer + offer ──► offer{targetId: viewer}
//!   answer         ──► set remote description, flush buffered candidates
//!   ice-candidate  ──► add remote candidate (buffered until the answer)
//!   viewer-left    ──► close that viewer's session
//! ```

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, NegotiationError, Result};
use crate::media::{MediaEngine, PeerEvent, PeerEventKind, PeerEventSink, PeerRole, PeerState};
use crate::protocol::{ClientMessage, IceCandidate, SdpType, ServerMessage, SessionDescription};
use crate::registry::{ConnectionId, StreamId};
use crate::session::{NegotiationPhase, SessionTable};

use super::config::ClientConfig;
use super::connector::SignalSender;
use super::negotiation::{candidate_message, emit, spawn_negotiation, Negotiated};

/// Events from the streamer driver
#[derive(Debug, Clone, PartialEq)]
pub enum StreamerEvent {
    /// Signaling connection accepted
    Connected { client_id: ConnectionId },

    /// Stream registered; `embed_url` is the viewer-facing link
    Registered {
        stream_id: StreamId,
        embed_url: Option<String>,
    },

    /// A viewer joined and negotiation started
    ViewerJoined { viewer_id: ConnectionId },

    /// A viewer left and its session was closed
    ViewerLeft { viewer_id: ConnectionId },

    /// Connectivity of a viewer's peer changed
    PeerState {
        viewer_id: ConnectionId,
        state: PeerState,
    },

    /// The engine rejected an offer, answer or candidate
    NegotiationFailed {
        viewer_id: Option<ConnectionId>,
        reason: String,
    },

    /// Server reported an error
    ServerError { message: String },

    /// Local tracks released and the stream stopped
    Stopped,
}

/// Streamer negotiation driver
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use rtc_signal::client::{ClientConfig, SignalingConnector, Streamer};
/// use rtc_signal::media::MediaEngine;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example<E: MediaEngine>(engine: E) -> rtc_signal::error::Result<()> {
/// let config = ClientConfig::new("ws://localhost:3000").stream_id("cam-1");
/// let (signal, inbound) = SignalingConnector::connect(&config).await?.into_parts();
/// let (streamer, mut events) = Streamer::new(Arc::new(engine), signal, &config);
///
/// tokio::spawn(async move {
///     while let Some(event) = events.recv().await {
///         println!("Event: {:?}", event);
///     }
/// });
///
/// streamer.run(inbound, CancellationToken::new()).await?;
/// # Ok(())
/// # }
/// ```
pub struct Streamer<E: MediaEngine> {
    engine: Arc<E>,
    signal: SignalSender,
    requested_stream: Option<StreamId>,
    stream_id: Option<StreamId>,
    sessions: SessionTable<E::Peer>,
    events: mpsc::Sender<StreamerEvent>,
    peer_tx: mpsc::UnboundedSender<PeerEvent>,
    peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
    done_tx: mpsc::UnboundedSender<Negotiated<E::Peer>>,
    done_rx: mpsc::UnboundedReceiver<Negotiated<E::Peer>>,
}

impl<E: MediaEngine> Streamer<E> {
    /// Create a driver.
    ///
    /// Returns the driver and a receiver for events.
    pub fn new(
        engine: Arc<E>,
        signal: SignalSender,
        config: &ClientConfig,
    ) -> (Self, mpsc::Receiver<StreamerEvent>) {
        let (events, rx) = mpsc::channel(config.event_capacity.max(1));
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let streamer = Self {
            engine,
            signal,
            requested_stream: config.stream_id.clone().map(StreamId::from),
            stream_id: None,
            sessions: SessionTable::new(),
            events,
            peer_tx,
            peer_rx,
            done_tx,
            done_rx,
        };

        (streamer, rx)
    }

    /// Acquire local tracks and drive negotiation until `shutdown` fires or
    /// the signaling connection closes.
    ///
    /// Every session is closed and the local tracks released before this
    /// returns.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<ServerMessage>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        if let Err(e) = self.engine.create_local_tracks().await {
            self.fail(None, e.clone());
            return Err(e.into());
        }

        let result = loop {
            tokio::select! {
                _ = shutdown.cancelled() => break Ok(()),
                msg = inbound.recv() => match msg {
                    Some(msg) => self.handle_message(msg).await,
                    None => break Err(Error::ConnectionClosed),
                },
                Some(done) = self.done_rx.recv() => self.on_offer_ready(done),
                Some(event) = self.peer_rx.recv() => self.on_peer_event(event),
            }
        };

        self.stop();
        result
    }

    async fn handle_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Connected { client_id } => {
                tracing::info!(client_id = %client_id, "Connected to signaling server");
                self.signal.send(ClientMessage::RegisterStreamer {
                    stream_id: self.requested_stream.clone(),
                });
                emit(&self.events, StreamerEvent::Connected { client_id });
            }
            ServerMessage::Registered {
                stream_id,
                embed_url,
                ..
            } => {
                tracing::info!(stream = %stream_id, "Stream registered");
                self.stream_id = Some(stream_id.clone());
                emit(
                    &self.events,
                    StreamerEvent::Registered {
                        stream_id,
                        embed_url,
                    },
                );
            }
            ServerMessage::ViewerJoined { viewer_id } => self.start_offer(viewer_id),
            ServerMessage::ViewerLeft { viewer_id } => {
                self.sessions.close(&viewer_id);
                tracing::info!(viewer = %viewer_id, sessions = self.sessions.len(), "Viewer left");
                emit(&self.events, StreamerEvent::ViewerLeft { viewer_id });
            }
            ServerMessage::Answer { answer, sender_id } => self.on_answer(sender_id, answer).await,
            ServerMessage::IceCandidate {
                candidate,
                sender_id,
            } => self.on_remote_candidate(sender_id, candidate).await,
            ServerMessage::Error { message } => {
                tracing::warn!(message = %message, "Server error");
                emit(&self.events, StreamerEvent::ServerError { message });
            }
            other => {
                tracing::debug!(kind = other.kind(), "Ignoring message");
            }
        }
    }

    fn start_offer(&mut self, viewer_id: ConnectionId) {
        let session = self.sessions.begin(viewer_id.clone());
        let sink = PeerEventSink::new(viewer_id.clone(), session.generation, self.peer_tx.clone());

        tracing::info!(viewer = %viewer_id, generation = session.generation, "Viewer joined, creating offer");

        spawn_negotiation(
            Arc::clone(&self.engine),
            PeerRole::Offerer,
            sink,
            session.cancel_token(),
            None,
            self.done_tx.clone(),
        );

        emit(&self.events, StreamerEvent::ViewerJoined { viewer_id });
    }

    fn on_offer_ready(&mut self, done: Negotiated<E::Peer>) {
        let Some(session) = self.sessions.current_mut(&done.peer_id, done.generation) else {
            tracing::debug!(
                viewer = %done.peer_id,
                generation = done.generation,
                "Discarding stale offer"
            );
            done.discard();
            return;
        };

        let viewer_id = done.peer_id;
        match done.result {
            Ok((peer, offer)) => {
                session.attach_peer(peer);
                session.transition(NegotiationPhase::OfferCreated);

                self.signal.send(ClientMessage::Offer {
                    offer: offer.to_payload(),
                    target_id: viewer_id.clone(),
                });
                session.transition(NegotiationPhase::AnswerPending);

                for candidate in session.mark_local_description_sent() {
                    self.signal.send(candidate_message(&candidate, &viewer_id));
                }

                tracing::debug!(viewer = %viewer_id, "Offer sent");
            }
            Err(e) => self.fail(Some(viewer_id), e),
        }
    }

    async fn on_answer(&mut self, viewer_id: ConnectionId, payload: Value) {
        let description = match SessionDescription::from_payload(&payload, SdpType::Answer) {
            Ok(description) => description,
            Err(e) => return self.fail(Some(viewer_id), e.into()),
        };

        let Some(session) = self.sessions.get_mut(&viewer_id) else {
            let error = NegotiationError::NoSession(viewer_id.clone());
            return self.fail(Some(viewer_id), error);
        };

        match session.set_remote_description(description).await {
            Ok(flushed) => {
                tracing::debug!(viewer = %viewer_id, flushed = flushed, "Answer applied");
            }
            Err(e) => self.fail(Some(viewer_id), e),
        }
    }

    async fn on_remote_candidate(&mut self, viewer_id: ConnectionId, payload: Value) {
        let candidate = match IceCandidate::from_payload(&payload) {
            Ok(candidate) => candidate,
            Err(e) => return self.fail(Some(viewer_id), e.into()),
        };

        let Some(session) = self.sessions.get_mut(&viewer_id) else {
            tracing::debug!(viewer = %viewer_id, "Candidate for unknown viewer, dropping");
            return;
        };

        if let Err(e) = session.add_remote_candidate(candidate).await {
            self.fail(Some(viewer_id), e);
        }
    }

    fn on_peer_event(&mut self, event: PeerEvent) {
        let Some(session) = self.sessions.current_mut(&event.peer_id, event.generation) else {
            tracing::trace!(viewer = %event.peer_id, "Ignoring event from stale peer");
            return;
        };

        match event.kind {
            PeerEventKind::LocalCandidate(candidate) => {
                if let Some(candidate) = session.local_candidate(candidate) {
                    self.signal.send(candidate_message(&candidate, &event.peer_id));
                }
            }
            PeerEventKind::StateChanged(state) => {
                if state == PeerState::Connected {
                    session.transition(NegotiationPhase::Connected);
                }
                tracing::debug!(viewer = %event.peer_id, state = ?state, "Peer state changed");
                emit(
                    &self.events,
                    StreamerEvent::PeerState {
                        viewer_id: event.peer_id,
                        state,
                    },
                );
            }
            PeerEventKind::RemoteTrack(_) => {
                tracing::trace!(viewer = %event.peer_id, "Ignoring remote track");
            }
        }
    }

    fn fail(&self, viewer_id: Option<ConnectionId>, error: NegotiationError) {
        tracing::warn!(viewer = ?viewer_id, error = %error, "Negotiation failed");
        emit(
            &self.events,
            StreamerEvent::NegotiationFailed {
                viewer_id,
                reason: error.to_string(),
            },
        );
    }

    fn stop(&mut self) {
        self.sessions.close_all();
        self.engine.release_local_tracks();

        if let Some(stream_id) = self.stream_id.take() {
            self.signal.send(ClientMessage::StopStream);
            tracing::info!(stream = %stream_id, "Stream stopped");
        }

        emit(&self.events, StreamerEvent::Stopped);
    }
}
