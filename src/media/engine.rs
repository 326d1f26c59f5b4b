//! Media engine collaborator traits
//!
//! The negotiation drivers never touch capture devices or transports
//! themselves. They talk to a [`MediaEngine`], which owns local tracks and
//! hands out one [`PeerConnection`] per remote endpoint.

use std::future::Future;

use crate::error::NegotiationError;
use crate::protocol::{IceCandidate, SessionDescription};

use super::event::PeerEventSink;

/// Which side of the offer/answer exchange a peer plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// Creates the offer (streamer side)
    Offerer,
    /// Answers a remote offer (viewer side)
    Answerer,
}

/// Native WebRTC engine for one endpoint
///
/// Shared by reference between the driver loop and its negotiation tasks.
pub trait MediaEngine: Send + Sync + 'static {
    /// Peer connection type produced by this engine
    type Peer: PeerConnection;

    /// Acquire local capture tracks
    fn create_local_tracks(&self) -> impl Future<Output = Result<(), NegotiationError>> + Send;

    /// Release local capture tracks
    ///
    /// Must complete synchronously so hardware is free before the signaling
    /// connection closes.
    fn release_local_tracks(&self);

    /// Create a peer connection wired to the local tracks
    ///
    /// Local candidates, remote tracks and state changes for this peer are
    /// reported through `events`.
    fn create_peer(
        &self,
        role: PeerRole,
        events: PeerEventSink,
    ) -> impl Future<Output = Result<Self::Peer, NegotiationError>> + Send;
}

/// One native peer connection
pub trait PeerConnection: Send + 'static {
    /// Create an offer for the local tracks
    fn create_offer(
        &mut self,
    ) -> impl Future<Output = Result<SessionDescription, NegotiationError>> + Send;

    /// Create an answer to the applied remote offer
    fn create_answer(
        &mut self,
    ) -> impl Future<Output = Result<SessionDescription, NegotiationError>> + Send;

    /// Apply a locally created description
    fn set_local_description(
        &mut self,
        description: SessionDescription,
    ) -> impl Future<Output = Result<(), NegotiationError>> + Send;

    /// Apply the remote side's description
    fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> impl Future<Output = Result<(), NegotiationError>> + Send;

    /// Add a remote connectivity candidate
    fn add_remote_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> impl Future<Output = Result<(), NegotiationError>> + Send;

    /// Tear the connection down and free native resources
    fn close(&mut self);
}
