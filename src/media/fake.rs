//! Scripted media engine for driver tests
//!
//! Records every engine call in a shared log and keeps each peer's event
//! sink so tests can inject candidates, tracks and state changes.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::error::NegotiationError;
use crate::protocol::{IceCandidate, SessionDescription};
use crate::registry::ConnectionId;

use super::engine::{MediaEngine, PeerConnection, PeerRole};
use super::event::PeerEventSink;

#[derive(Debug)]
struct Shared {
    log: Mutex<Vec<String>>,
    sinks: Mutex<Vec<PeerEventSink>>,
    failing: Mutex<HashSet<&'static str>>,
    next_peer: AtomicUsize,
    held: watch::Sender<bool>,
}

/// Engine double shared between a driver and its test
#[derive(Debug, Clone)]
pub struct FakeEngine {
    shared: Arc<Shared>,
}

impl FakeEngine {
    pub fn new() -> Self {
        let (held, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                log: Mutex::new(Vec::new()),
                sinks: Mutex::new(Vec::new()),
                failing: Mutex::new(HashSet::new()),
                next_peer: AtomicUsize::new(1),
                held,
            }),
        }
    }

    /// Every call recorded so far
    pub fn log(&self) -> Vec<String> {
        self.shared.log.lock().unwrap().clone()
    }

    /// Whether `entry` was recorded
    pub fn logged(&self, entry: &str) -> bool {
        self.log().iter().any(|e| e == entry)
    }

    /// Latest sink handed out for `peer_id`
    pub fn sink(&self, peer_id: &ConnectionId) -> Option<PeerEventSink> {
        self.shared
            .sinks
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|sink| sink.peer_id() == peer_id)
            .cloned()
    }

    /// Make an operation fail: `tracks`, `offer`, `answer`, `remote` or `candidate`
    pub fn fail_on(&self, op: &'static str) {
        self.shared.failing.lock().unwrap().insert(op);
    }

    /// Undo [`fail_on`](Self::fail_on)
    pub fn recover(&self, op: &'static str) {
        self.shared.failing.lock().unwrap().remove(op);
    }

    /// Hold offer and answer creation until released
    pub fn hold(&self, held: bool) {
        self.shared.held.send_replace(held);
    }

    fn record(&self, entry: String) {
        self.shared.log.lock().unwrap().push(entry);
    }

    fn check(&self, op: &'static str) -> Result<(), NegotiationError> {
        if self.shared.failing.lock().unwrap().contains(op) {
            Err(NegotiationError::Engine(format!("{} rejected", op)))
        } else {
            Ok(())
        }
    }

    async fn wait_released(&self) {
        let mut rx = self.shared.held.subscribe();
        let _ = rx.wait_for(|held| !*held).await;
    }
}

impl MediaEngine for FakeEngine {
    type Peer = FakePeer;

    async fn create_local_tracks(&self) -> Result<(), NegotiationError> {
        self.record("tracks:create".into());
        self.check("tracks")
    }

    fn release_local_tracks(&self) {
        self.record("tracks:release".into());
    }

    async fn create_peer(
        &self,
        role: PeerRole,
        events: PeerEventSink,
    ) -> Result<FakePeer, NegotiationError> {
        let id = self.shared.next_peer.fetch_add(1, Ordering::Relaxed);
        self.record(format!("peer{}:create:{:?}", id, role));
        self.shared.sinks.lock().unwrap().push(events);

        Ok(FakePeer {
            id,
            engine: self.clone(),
            closed: false,
        })
    }
}

/// Peer double; every call lands in the engine log as `peer<N>:<call>`
#[derive(Debug)]
pub struct FakePeer {
    id: usize,
    engine: FakeEngine,
    closed: bool,
}

impl FakePeer {
    fn record(&self, call: impl std::fmt::Display) {
        self.engine.record(format!("peer{}:{}", self.id, call));
    }
}

impl PeerConnection for FakePeer {
    async fn create_offer(&mut self) -> Result<SessionDescription, NegotiationError> {
        self.engine.wait_released().await;
        self.record("offer");
        self.engine.check("offer")?;
        Ok(SessionDescription::offer(format!("v=0 offer-{}", self.id)))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, NegotiationError> {
        self.engine.wait_released().await;
        self.record("answer");
        self.engine.check("answer")?;
        Ok(SessionDescription::answer(format!("v=0 answer-{}", self.id)))
    }

    async fn set_local_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.record(format_args!("local:{}", description.sdp));
        Ok(())
    }

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.record(format_args!("remote:{}", description.sdp));
        self.engine.check("remote")
    }

    async fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<(), NegotiationError> {
        self.record(format_args!("candidate:{}", candidate.candidate));
        self.engine.check("candidate")
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.record("close");
        }
    }
}
