//! Signaling clients
//!
//! Provides the endpoint side of the protocol:
//! - [`SignalingConnector`]: WebSocket connection to the signaling server
//! - [`Streamer`]: publishes local tracks and negotiates one session per viewer
//! - [`Viewer`]: answers the streamer's offer and surfaces remote tracks

pub mod config;
pub mod connector;
mod negotiation;
pub mod streamer;
pub mod viewer;

pub use config::ClientConfig;
pub use connector::{SignalSender, SignalingConnector};
pub use streamer::{Streamer, StreamerEvent};
pub use viewer::{Viewer, ViewerEvent};
