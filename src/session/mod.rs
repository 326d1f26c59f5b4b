//! Client-side negotiation sessions
//!
//! One [`PeerSession`] per remote endpoint, held in a [`SessionTable`] owned
//! by a negotiation driver.

pub mod state;

pub use state::{CandidateDisposition, NegotiationPhase, PeerSession, SessionTable};
