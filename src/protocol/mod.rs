//! Signaling wire protocol
//!
//! JSON text frames over a persistent WebSocket, each an object tagged by
//! `type`:
//!
//! ```text
//!  endpoint ──register-streamer / register-viewer──► mediator
//!  endpoint ◄──────connected / registered / error──── mediator
//!  streamer ◄──────────────viewer-joined───────────── mediator
//!  streamer ──offer{targetId}──► mediator ──offer{senderId}──► viewer
//!  streamer ◄─answer{senderId}── mediator ◄─answer{targetId}── viewer
//!         ◄──────────ice-candidate (both directions)──────────►
//!  viewer   ◄──────────────stream-ended────────────── mediator
//! ```

pub mod codec;
pub mod message;
pub mod payload;

pub use codec::{decode, encode, Envelope, OutboundFrame};
pub use message::{ClientMessage, ServerMessage};
pub use payload::{IceCandidate, SdpType, SessionDescription};
