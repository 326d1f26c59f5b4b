//! Connection and stream registries
//!
//! Two maps owned by the [`Mediator`](crate::server::Mediator) and mutated
//! together under its lock:
//!
//! ```text
//!   ConnectionRegistry                     StreamRegistry
//!  ┌──────────────────────────┐          ┌───────────────────────────┐
//!  │ id → { role, streamId,   │          │ streamId → {              │
//!  │        channel }         │◄────────►│   streamer_id,            │
//!  └──────────────────────────┘          │   viewers: {id, ..},      │
//!                                        │   created_at }            │
//!                                        └───────────────────────────┘
//! ```
//!
//! Every id in a stream's viewer set is a live connection with role
//! [`Role::Viewer`] bound to that stream.

pub mod connection;
pub mod entry;
pub mod error;
pub mod key;
pub mod store;

pub use connection::{ConnectionEntry, ConnectionRegistry, Role};
pub use entry::StreamEntry;
pub use error::RegistryError;
pub use key::{ConnectionId, StreamId};
pub use store::StreamRegistry;
