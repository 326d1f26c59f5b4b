//! Offer/answer creation tasks shared by both drivers
//!
//! Creating a description can take a while inside the engine, so it runs in
//! a spawned task that owns the new peer until it is done. The task stops at
//! the next step once its session's token is cancelled, closing the peer it
//! created. Finished work is posted back to the driver loop tagged with the
//! session generation; the loop decides whether it is still wanted.

use std::fmt::Debug;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::NegotiationError;
use crate::media::{MediaEngine, PeerConnection, PeerEventSink, PeerRole};
use crate::protocol::{ClientMessage, IceCandidate, SessionDescription};
use crate::registry::ConnectionId;

/// Outcome of one negotiation task
pub(crate) struct Negotiated<P> {
    pub peer_id: ConnectionId,
    pub generation: u64,
    pub result: Result<(P, SessionDescription), NegotiationError>,
}

impl<P: PeerConnection> Negotiated<P> {
    /// Close the peer of a result nobody wants any more
    pub fn discard(self) {
        if let Ok((mut peer, _)) = self.result {
            peer.close();
        }
    }
}

/// Spawn peer creation plus offer (or answer, when `remote` is given) creation
pub(crate) fn spawn_negotiation<E: MediaEngine>(
    engine: Arc<E>,
    role: PeerRole,
    sink: PeerEventSink,
    token: CancellationToken,
    remote: Option<SessionDescription>,
    done: mpsc::UnboundedSender<Negotiated<E::Peer>>,
) {
    let peer_id = sink.peer_id().clone();
    let generation = sink.generation();

    tokio::spawn(async move {
        let Some(result) = negotiate(engine.as_ref(), role, sink, &token, remote).await else {
            tracing::debug!(peer = %peer_id, generation = generation, "Negotiation cancelled");
            return;
        };

        let negotiated = Negotiated {
            peer_id,
            generation,
            result,
        };
        if let Err(mpsc::error::SendError(negotiated)) = done.send(negotiated) {
            negotiated.discard();
        }
    });
}

async fn negotiate<E: MediaEngine>(
    engine: &E,
    role: PeerRole,
    sink: PeerEventSink,
    token: &CancellationToken,
    remote: Option<SessionDescription>,
) -> Option<Result<(E::Peer, SessionDescription), NegotiationError>> {
    let mut peer = tokio::select! {
        biased;
        _ = token.cancelled() => return None,
        peer = engine.create_peer(role, sink) => match peer {
            Ok(peer) => peer,
            Err(e) => return Some(Err(e)),
        },
    };

    let steps = async {
        if let Some(offer) = remote {
            peer.set_remote_description(offer).await?;
        }
        let local = match role {
            PeerRole::Offerer => peer.create_offer().await?,
            PeerRole::Answerer => peer.create_answer().await?,
        };
        peer.set_local_description(local.clone()).await?;
        Ok::<_, NegotiationError>(local)
    };

    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        result = steps => Some(result),
    };

    match outcome {
        Some(Ok(local)) => Some(Ok((peer, local))),
        Some(Err(e)) => {
            peer.close();
            Some(Err(e))
        }
        None => {
            peer.close();
            None
        }
    }
}

/// `ice-candidate` message carrying a local candidate to `target`
pub(crate) fn candidate_message(candidate: &IceCandidate, target: &ConnectionId) -> ClientMessage {
    ClientMessage::IceCandidate {
        candidate: candidate.to_payload(),
        target_id: target.clone(),
    }
}

/// Deliver a driver event without blocking the driver loop
pub(crate) fn emit<T: Debug>(events: &mpsc::Sender<T>, event: T) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(event)) => {
            tracing::warn!(event = ?event, "Event channel full, dropping event");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}
