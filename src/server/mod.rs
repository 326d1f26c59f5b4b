//! Signaling server
//!
//! Accepts WebSocket connections and routes protocol messages between them
//! through a single [`Mediator`].

pub mod channel;
pub mod config;
pub mod connection;
pub mod listener;
pub mod mediator;

pub use channel::{ClientChannel, Delivery};
pub use config::ServerConfig;
pub use connection::Connection;
pub use listener::SignalingServer;
pub use mediator::{Mediator, INVALID_MESSAGE_FORMAT};
