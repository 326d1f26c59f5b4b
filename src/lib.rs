//! WebRTC signaling server and negotiation drivers
//!
//! One streamer publishes a live session under a stream id; any number of
//! viewers register against that id and negotiate a direct media session with
//! the streamer. Session descriptions and ICE candidates are relayed through
//! the [`Mediator`](server::Mediator), which never looks inside them.
//!
//! # Server
//!
//! ```no_run
//! use rtc_signal::{ServerConfig, SignalingServer};
//!
//! # async fn example() -> rtc_signal::error::Result<()> {
//! let server = SignalingServer::new(ServerConfig::from_env());
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Clients
//!
//! The [`client`] module drives a [`MediaEngine`](media::MediaEngine) from the
//! streamer side ([`Streamer`](client::Streamer)) or the viewer side
//! ([`Viewer`](client::Viewer)), exchanging messages with the server through a
//! [`SignalingConnector`](client::SignalingConnector).

pub mod client;
pub mod error;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use registry::{ConnectionId, StreamId};
pub use server::{Mediator, ServerConfig, SignalingServer};
