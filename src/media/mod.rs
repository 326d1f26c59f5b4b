//! Media engine boundary
//!
//! This module provides:
//! - The [`MediaEngine`] and [`PeerConnection`] traits a native WebRTC stack
//!   implements
//! - [`PeerEventSink`], through which engines report local candidates,
//!   remote tracks and connectivity changes

pub mod engine;
pub mod event;

#[cfg(test)]
pub(crate) mod fake;

pub use engine::{MediaEngine, PeerConnection, PeerRole};
pub use event::{PeerEvent, PeerEventKind, PeerEventSink, PeerState, RemoteTrack, TrackKind};
