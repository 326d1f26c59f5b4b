//! Message router and registry owner
//!
//! The mediator holds both registries behind one lock. Each inbound event
//! (a message or a close) takes the lock once, mutates what it needs and
//! queues its outbound frames before releasing it, so every event is atomic
//! with respect to every other connection. Queueing never blocks: frames go
//! into per-client bounded channels and are dropped for clients that cannot
//! keep up.

use std::collections::HashSet;

use tokio::sync::Mutex;

use crate::error::ProtocolError;
use crate::protocol::{codec, ClientMessage, OutboundFrame, ServerMessage};
use crate::registry::{
    ConnectionId, ConnectionRegistry, RegistryError, Role, StreamEntry, StreamId, StreamRegistry,
};
use crate::stats::{RelayMetrics, RelaySnapshot, ServerStats, StreamSummary};

use super::channel::{ClientChannel, Delivery};
use super::config::ServerConfig;

/// Reply text for frames that cannot be decoded
pub const INVALID_MESSAGE_FORMAT: &str = "Invalid message format";

#[derive(Debug, Default)]
struct Registries {
    connections: ConnectionRegistry,
    streams: StreamRegistry,
}

/// Signaling mediator
pub struct Mediator {
    state: Mutex<Registries>,
    config: ServerConfig,
    metrics: RelayMetrics,
}

impl Mediator {
    /// Create a mediator with empty registries
    pub fn new(config: ServerConfig) -> Self {
        Self {
            state: Mutex::new(Registries::default()),
            config,
            metrics: RelayMetrics::new(),
        }
    }

    /// Register a new connection and send it its id
    pub async fn accept(&self, channel: ClientChannel) -> ConnectionId {
        let id = ConnectionId::generate();
        let mut state = self.state.lock().await;

        state.connections.insert(id.clone(), channel.clone());
        self.send(
            &channel,
            &ServerMessage::Connected {
                client_id: id.clone(),
            },
        );

        tracing::info!(
            client_id = %id,
            clients = state.connections.len(),
            "Client connected"
        );

        id
    }

    /// Decode and handle one inbound text frame
    pub async fn handle_text(&self, id: &ConnectionId, text: &str) {
        match codec::decode::<ClientMessage>(text) {
            Ok(msg) => self.handle_message(id, msg).await,
            Err(error) => self.reject(id, error).await,
        }
    }

    /// Report an undecodable frame to its sender
    ///
    /// Unknown message types are only logged.
    pub async fn reject(&self, id: &ConnectionId, error: ProtocolError) {
        if !error.is_reportable() {
            tracing::warn!(client_id = %id, error = %error, "Ignoring message");
            return;
        }

        self.metrics.record_malformed();
        tracing::warn!(client_id = %id, error = %error, "Malformed message");

        let state = self.state.lock().await;
        self.reply(
            &state.connections,
            id,
            &ServerMessage::error(INVALID_MESSAGE_FORMAT),
        );
    }

    /// Handle one decoded message
    pub async fn handle_message(&self, id: &ConnectionId, msg: ClientMessage) {
        tracing::debug!(client_id = %id, kind = msg.kind(), "Message received");

        // Failures below have already been reported or deliberately dropped
        match msg {
            ClientMessage::RegisterStreamer { stream_id } => {
                let _ = self.register_streamer(id, stream_id).await;
            }
            ClientMessage::RegisterViewer { stream_id } => {
                let _ = self.register_viewer(id, stream_id).await;
            }
            ClientMessage::Offer { offer, target_id } => {
                let msg = ServerMessage::Offer {
                    offer,
                    sender_id: id.clone(),
                };
                let _ = self.relay(id, &target_id, msg).await;
            }
            ClientMessage::Answer { answer, target_id } => {
                let msg = ServerMessage::Answer {
                    answer,
                    sender_id: id.clone(),
                };
                let _ = self.relay(id, &target_id, msg).await;
            }
            ClientMessage::IceCandidate {
                candidate,
                target_id,
            } => {
                let msg = ServerMessage::IceCandidate {
                    candidate,
                    sender_id: id.clone(),
                };
                let _ = self.relay(id, &target_id, msg).await;
            }
            ClientMessage::StopStream => {
                self.stop_stream(id).await;
            }
            ClientMessage::Unknown => {
                tracing::warn!(client_id = %id, "Unknown message type");
            }
        }
    }

    /// Make `id` the streamer of `requested` (or of a generated stream id)
    ///
    /// An existing stream under the same id is taken over: every live viewer
    /// bound to the id joins the new stream and the new streamer receives a
    /// `viewer-joined` for each of them.
    pub async fn register_streamer(
        &self,
        id: &ConnectionId,
        requested: Option<StreamId>,
    ) -> Result<StreamId, RegistryError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let stream_id = StreamId::requested_or_generated(requested.as_ref().map(StreamId::as_str));

        if let Err(error) = state
            .connections
            .assign(id, Role::Streamer, stream_id.clone())
        {
            tracing::warn!(client_id = %id, error = %error, "Streamer registration rejected");
            self.reply(
                &state.connections,
                id,
                &ServerMessage::error(error.client_message()),
            );
            return Err(error);
        }

        let viewers = state.connections.viewers_bound_to(&stream_id);
        let entry = StreamEntry::new(stream_id.clone(), id.clone()).with_viewers(viewers.clone());

        if let Some(previous) = state.streams.insert(entry) {
            tracing::warn!(
                stream = %stream_id,
                previous_streamer = %previous.streamer_id,
                streamer = %id,
                "Stream taken over by new streamer"
            );
        }

        tracing::info!(
            client_id = %id,
            stream = %stream_id,
            viewers = viewers.len(),
            "Streamer registered"
        );

        self.reply(
            &state.connections,
            id,
            &ServerMessage::Registered {
                role: Role::Streamer,
                stream_id: stream_id.clone(),
                embed_url: Some(self.config.embed_url(stream_id.as_str())),
            },
        );

        let mut viewers: Vec<ConnectionId> = viewers.into_iter().collect();
        viewers.sort();
        for viewer_id in viewers {
            self.reply(
                &state.connections,
                id,
                &ServerMessage::ViewerJoined { viewer_id },
            );
        }

        Ok(stream_id)
    }

    /// Bind `id` as a viewer of an existing stream
    ///
    /// Unknown streams are reported to the caller, which stays connected and
    /// unassigned.
    pub async fn register_viewer(
        &self,
        id: &ConnectionId,
        requested: Option<StreamId>,
    ) -> Result<StreamId, RegistryError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let entry = state
            .connections
            .get(id)
            .ok_or_else(|| RegistryError::ConnectionNotFound(id.clone()))?;

        let checked = if entry.role != Role::Unassigned {
            Err(RegistryError::AlreadyRegistered(id.clone()))
        } else {
            match requested.filter(|stream_id| !stream_id.as_str().is_empty()) {
                Some(stream_id) if state.streams.contains(&stream_id) => Ok(stream_id),
                other => Err(RegistryError::StreamNotFound(
                    other.unwrap_or_else(|| StreamId::new("")),
                )),
            }
        };

        let stream_id = match checked {
            Ok(stream_id) => stream_id,
            Err(error) => {
                tracing::info!(client_id = %id, error = %error, "Viewer registration rejected");
                self.reply(
                    &state.connections,
                    id,
                    &ServerMessage::error(error.client_message()),
                );
                return Err(error);
            }
        };

        state
            .connections
            .assign(id, Role::Viewer, stream_id.clone())?;
        let streamer_id = state.streams.add_viewer(&stream_id, id.clone())?;

        tracing::info!(client_id = %id, stream = %stream_id, "Viewer registered");

        self.reply(
            &state.connections,
            id,
            &ServerMessage::Registered {
                role: Role::Viewer,
                stream_id: stream_id.clone(),
                embed_url: None,
            },
        );
        self.reply(
            &state.connections,
            &streamer_id,
            &ServerMessage::ViewerJoined {
                viewer_id: id.clone(),
            },
        );

        Ok(stream_id)
    }

    /// Forward a negotiation message to `target`
    ///
    /// Missing or closed targets are dropped without telling the sender.
    pub async fn relay(
        &self,
        from: &ConnectionId,
        target: &ConnectionId,
        msg: ServerMessage,
    ) -> Result<(), RegistryError> {
        let state = self.state.lock().await;

        match state.connections.reachable(target) {
            Ok(channel) => {
                if self.send(channel, &msg) == Delivery::Queued {
                    self.metrics.record_relayed();
                }
                tracing::debug!(
                    from = %from,
                    target = %target,
                    kind = msg.kind(),
                    "Relayed"
                );
                Ok(())
            }
            Err(error) => {
                self.metrics.record_dropped();
                tracing::debug!(
                    from = %from,
                    target = %target,
                    kind = msg.kind(),
                    "Relay target unreachable, dropping"
                );
                Err(error)
            }
        }
    }

    /// End the caller's stream
    ///
    /// Returns the number of viewers notified. A no-op for connections that
    /// do not own a stream.
    pub async fn stop_stream(&self, id: &ConnectionId) -> usize {
        let mut guard = self.state.lock().await;
        self.end_stream(&mut guard, id)
    }

    /// Clean up after a closed connection
    pub async fn disconnect(&self, id: &ConnectionId) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(entry) = state.connections.get(id) else {
            return;
        };
        let role = entry.role;
        let stream_id = entry.stream_id.clone();

        match (role, stream_id) {
            (Role::Streamer, Some(_)) => {
                self.end_stream(state, id);
            }
            (Role::Viewer, Some(stream_id)) => {
                if let Some(streamer_id) = state.streams.remove_viewer(&stream_id, id) {
                    self.reply(
                        &state.connections,
                        &streamer_id,
                        &ServerMessage::ViewerLeft {
                            viewer_id: id.clone(),
                        },
                    );
                }
            }
            _ => {}
        }

        state.connections.remove(id);

        tracing::info!(
            client_id = %id,
            role = ?role,
            clients = state.connections.len(),
            "Client disconnected"
        );
    }

    /// Health snapshot
    pub async fn stats(&self) -> ServerStats {
        let state = self.state.lock().await;
        ServerStats {
            active_clients: state.connections.len(),
            active_streams: state.streams.len(),
        }
    }

    /// Listing of every active stream
    pub async fn list_streams(&self) -> Vec<StreamSummary> {
        self.state.lock().await.streams.summaries()
    }

    /// Viewer set of a stream, if it exists
    pub async fn stream_viewers(&self, stream_id: &StreamId) -> Option<HashSet<ConnectionId>> {
        let state = self.state.lock().await;
        state
            .streams
            .get(stream_id)
            .map(|entry| entry.viewers.clone())
    }

    /// Role and stream binding of a connection, if it is live
    pub async fn connection_role(&self, id: &ConnectionId) -> Option<(Role, Option<StreamId>)> {
        let state = self.state.lock().await;
        state
            .connections
            .get(id)
            .map(|entry| (entry.role, entry.stream_id.clone()))
    }

    /// Relay counters
    pub fn metrics(&self) -> RelaySnapshot {
        self.metrics.snapshot()
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn end_stream(&self, state: &mut Registries, id: &ConnectionId) -> usize {
        let Some(entry) = state.connections.get(id) else {
            return 0;
        };
        if entry.role != Role::Streamer {
            return 0;
        }
        let Some(stream_id) = entry.stream_id.clone() else {
            return 0;
        };
        let Some(stream) = state.streams.remove_owned(&stream_id, id) else {
            return 0;
        };

        let frame = match codec::encode(&ServerMessage::StreamEnded) {
            Ok(frame) => frame,
            Err(error) => {
                tracing::error!(error = %error, "Failed to encode stream-ended");
                return 0;
            }
        };

        let mut notified = 0;
        for viewer_id in &stream.viewers {
            if let Ok(channel) = state.connections.reachable(viewer_id) {
                if self.deliver(channel, frame.clone()) == Delivery::Queued {
                    notified += 1;
                }
            }
        }

        tracing::info!(
            stream = %stream_id,
            viewers = stream.viewer_count(),
            notified = notified,
            "Stream ended"
        );

        notified
    }

    fn reply(&self, connections: &ConnectionRegistry, id: &ConnectionId, msg: &ServerMessage) {
        if let Ok(channel) = connections.reachable(id) {
            self.send(channel, msg);
        }
    }

    fn send(&self, channel: &ClientChannel, msg: &ServerMessage) -> Delivery {
        match codec::encode(msg) {
            Ok(frame) => self.deliver(channel, frame),
            Err(error) => {
                tracing::error!(kind = msg.kind(), error = %error, "Failed to encode message");
                Delivery::Closed
            }
        }
    }

    fn deliver(&self, channel: &ClientChannel, frame: OutboundFrame) -> Delivery {
        let delivery = channel.send(frame);
        match delivery {
            Delivery::Queued => {}
            Delivery::Overflow => {
                self.metrics.record_overflow();
                tracing::warn!("Client outbound queue full, dropping frame");
            }
            Delivery::Closed => {
                tracing::trace!("Client channel closed, dropping frame");
            }
        }
        delivery
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    use super::*;

    struct TestClient {
        id: ConnectionId,
        rx: mpsc::Receiver<OutboundFrame>,
    }

    impl TestClient {
        fn drain(&mut self) -> Vec<Value> {
            let mut out = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                out.push(serde_json::from_str(frame.as_str()).unwrap());
            }
            out
        }
    }

    fn mediator() -> Mediator {
        Mediator::new(ServerConfig::default().public_url("http://signal.test"))
    }

    async fn connect(mediator: &Mediator) -> TestClient {
        let (channel, rx) = ClientChannel::pair(64);
        let id = mediator.accept(channel).await;
        let mut client = TestClient { id, rx };

        let hello = client.drain();
        assert_eq!(
            hello,
            vec![json!({"type": "connected", "clientId": client.id.as_str()})]
        );
        client
    }

    async fn send(mediator: &Mediator, client: &TestClient, msg: Value) {
        mediator.handle_text(&client.id, &msg.to_string()).await;
    }

    async fn streamer(mediator: &Mediator, stream_id: &str) -> TestClient {
        let mut client = connect(mediator).await;
        send(
            mediator,
            &client,
            json!({"type": "register-streamer", "streamId": stream_id}),
        )
        .await;
        client.drain();
        client
    }

    async fn viewer(mediator: &Mediator, stream_id: &str) -> TestClient {
        let mut client = connect(mediator).await;
        send(
            mediator,
            &client,
            json!({"type": "register-viewer", "streamId": stream_id}),
        )
        .await;
        client.drain();
        client
    }

    /// Every stream's viewer set equals the live viewers bound to it
    async fn assert_consistent(mediator: &Mediator) {
        let state = mediator.state.lock().await;
        for summary in state.streams.summaries() {
            let stream = state.streams.get(&summary.id).unwrap();
            assert_eq!(
                stream.viewers,
                state.connections.viewers_bound_to(&summary.id),
                "viewer set of {} diverged",
                summary.id
            );
            assert_eq!(
                state.connections.get(&stream.streamer_id).map(|c| c.role),
                Some(Role::Streamer)
            );
        }
    }

    #[tokio::test]
    async fn test_streamer_registers_with_embed_url() {
        let mediator = mediator();
        let mut client = connect(&mediator).await;

        send(
            &mediator,
            &client,
            json!({"type": "register-streamer", "streamId": "cam-1"}),
        )
        .await;

        assert_eq!(
            client.drain(),
            vec![json!({
                "type": "registered",
                "role": "streamer",
                "streamId": "cam-1",
                "embedUrl": "http://signal.test/viewer.html?streamId=cam-1",
            })]
        );
        assert_eq!(mediator.stats().await.active_streams, 1);
    }

    #[tokio::test]
    async fn test_streamer_without_id_gets_generated_one() {
        let mediator = mediator();
        let client = connect(&mediator).await;

        let stream_id = mediator.register_streamer(&client.id, None).await.unwrap();
        assert_eq!(stream_id.as_str().len(), 36);

        let stream_id = mediator
            .register_streamer(&connect(&mediator).await.id, Some(StreamId::new("")))
            .await
            .unwrap();
        assert_eq!(stream_id.as_str().len(), 36);
    }

    #[tokio::test]
    async fn test_viewer_joins_and_streamer_is_notified() {
        let mediator = mediator();
        let mut streamer = streamer(&mediator, "cam-1").await;
        let mut viewer = connect(&mediator).await;

        send(
            &mediator,
            &viewer,
            json!({"type": "register-viewer", "streamId": "cam-1"}),
        )
        .await;

        assert_eq!(
            viewer.drain(),
            vec![json!({"type": "registered", "role": "viewer", "streamId": "cam-1"})]
        );
        assert_eq!(
            streamer.drain(),
            vec![json!({"type": "viewer-joined", "viewerId": viewer.id.as_str()})]
        );

        let viewers = mediator
            .stream_viewers(&StreamId::new("cam-1"))
            .await
            .unwrap();
        assert!(viewers.contains(&viewer.id));
        assert_consistent(&mediator).await;
    }

    #[tokio::test]
    async fn test_viewer_of_missing_stream() {
        let mediator = mediator();
        let mut viewer = connect(&mediator).await;
        let before = mediator.stats().await;

        send(
            &mediator,
            &viewer,
            json!({"type": "register-viewer", "streamId": "missing"}),
        )
        .await;

        assert_eq!(
            viewer.drain(),
            vec![json!({"type": "error", "message": "Stream not found"})]
        );
        assert_eq!(mediator.stats().await, before);
        assert_eq!(
            mediator.connection_role(&viewer.id).await,
            Some((Role::Unassigned, None))
        );

        // Still connected and unassigned, so it can register later
        let _streamer = streamer(&mediator, "cam-1").await;
        let result = mediator
            .register_viewer(&viewer.id, Some(StreamId::new("cam-1")))
            .await;
        tokio_test::assert_ok!(result);
    }

    #[tokio::test]
    async fn test_viewer_without_stream_id() {
        let mediator = mediator();
        let mut viewer = connect(&mediator).await;

        send(&mediator, &viewer, json!({"type": "register-viewer"})).await;

        assert_eq!(
            viewer.drain(),
            vec![json!({"type": "error", "message": "Stream not found"})]
        );
    }

    #[tokio::test]
    async fn test_second_registration_rejected() {
        let mediator = mediator();
        let mut streamer = streamer(&mediator, "cam-1").await;

        send(
            &mediator,
            &streamer,
            json!({"type": "register-viewer", "streamId": "cam-1"}),
        )
        .await;

        assert_eq!(
            streamer.drain(),
            vec![json!({"type": "error", "message": "Already registered"})]
        );
        assert_eq!(
            mediator.connection_role(&streamer.id).await,
            Some((Role::Streamer, Some(StreamId::new("cam-1"))))
        );
    }

    #[tokio::test]
    async fn test_relay_is_symmetric() {
        let mediator = mediator();
        let mut streamer = streamer(&mediator, "cam-1").await;
        let mut viewer = viewer(&mediator, "cam-1").await;
        streamer.drain();

        let offer = json!({"type": "offer", "sdp": "v=0\r\no=- 1 2 IN IP4 0.0.0.0\r\n"});
        send(
            &mediator,
            &streamer,
            json!({"type": "offer", "offer": offer, "targetId": viewer.id.as_str()}),
        )
        .await;
        assert_eq!(
            viewer.drain(),
            vec![json!({"type": "offer", "offer": offer, "senderId": streamer.id.as_str()})]
        );

        // Pre-serialized payloads pass through untouched
        let answer = json!("{\"type\":\"answer\",\"sdp\":\"v=0\"}");
        send(
            &mediator,
            &viewer,
            json!({"type": "answer", "answer": answer, "targetId": streamer.id.as_str()}),
        )
        .await;
        assert_eq!(
            streamer.drain(),
            vec![json!({"type": "answer", "answer": answer, "senderId": viewer.id.as_str()})]
        );

        let candidate = json!({"candidate": "candidate:0 1 UDP 1 10.0.0.2 9 typ host", "sdpMid": "0", "sdpMLineIndex": 0});
        send(
            &mediator,
            &viewer,
            json!({"type": "ice-candidate", "candidate": candidate, "targetId": streamer.id.as_str()}),
        )
        .await;
        assert_eq!(
            streamer.drain(),
            vec![json!({"type": "ice-candidate", "candidate": candidate, "senderId": viewer.id.as_str()})]
        );

        assert_eq!(mediator.metrics().relayed, 3);
    }

    #[tokio::test]
    async fn test_relay_to_unreachable_target_is_silent() {
        let mediator = mediator();
        let mut sender = connect(&mediator).await;

        send(
            &mediator,
            &sender,
            json!({"type": "offer", "offer": {"type": "offer", "sdp": "v=0"}, "targetId": "nobody"}),
        )
        .await;
        assert!(sender.drain().is_empty());

        // Closed target channel behaves the same
        let target = connect(&mediator).await;
        let target_id = target.id.clone();
        drop(target);
        let result = mediator
            .relay(
                &sender.id,
                &target_id,
                ServerMessage::IceCandidate {
                    candidate: json!({"candidate": "x"}),
                    sender_id: sender.id.clone(),
                },
            )
            .await;
        assert_eq!(result, Err(RegistryError::TargetUnreachable(target_id)));
        assert!(sender.drain().is_empty());
        assert_eq!(mediator.metrics().dropped, 2);
    }

    #[tokio::test]
    async fn test_stop_stream_notifies_each_viewer_once() {
        let mediator = mediator();
        let streamer = streamer(&mediator, "cam-1").await;
        let mut v1 = viewer(&mediator, "cam-1").await;
        let mut v2 = viewer(&mediator, "cam-1").await;

        send(&mediator, &streamer, json!({"type": "stop-stream"})).await;

        assert_eq!(v1.drain(), vec![json!({"type": "stream-ended"})]);
        assert_eq!(v2.drain(), vec![json!({"type": "stream-ended"})]);
        assert!(mediator.stream_viewers(&StreamId::new("cam-1")).await.is_none());

        // Idempotent: no second broadcast, no error
        assert_eq!(mediator.stop_stream(&streamer.id).await, 0);
        send(&mediator, &streamer, json!({"type": "stop-stream"})).await;
        assert!(v1.drain().is_empty());
        assert!(v2.drain().is_empty());
    }

    #[tokio::test]
    async fn test_streamer_disconnect_equals_stop() {
        let mediator = mediator();
        let streamer = streamer(&mediator, "cam-1").await;
        let mut v1 = viewer(&mediator, "cam-1").await;

        mediator.disconnect(&streamer.id).await;

        assert_eq!(v1.drain(), vec![json!({"type": "stream-ended"})]);
        assert_eq!(mediator.stats().await.active_streams, 0);
        assert_eq!(mediator.connection_role(&streamer.id).await, None);

        // Stop after disconnect is a no-op too
        assert_eq!(mediator.stop_stream(&streamer.id).await, 0);
        assert!(v1.drain().is_empty());
    }

    #[tokio::test]
    async fn test_viewer_disconnect() {
        let mediator = mediator();
        let mut streamer = streamer(&mediator, "cam-1").await;
        let v1 = viewer(&mediator, "cam-1").await;
        let v2 = viewer(&mediator, "cam-1").await;
        streamer.drain();

        mediator.disconnect(&v1.id).await;

        assert_eq!(
            streamer.drain(),
            vec![json!({"type": "viewer-left", "viewerId": v1.id.as_str()})]
        );
        let viewers = mediator
            .stream_viewers(&StreamId::new("cam-1"))
            .await
            .unwrap();
        assert!(!viewers.contains(&v1.id));
        assert!(viewers.contains(&v2.id));

        // Last viewer leaving keeps the stream alive
        mediator.disconnect(&v2.id).await;
        assert_eq!(streamer.drain().len(), 1);
        assert_eq!(
            mediator.stream_viewers(&StreamId::new("cam-1")).await,
            Some(HashSet::new())
        );

        // Disconnect is idempotent
        mediator.disconnect(&v2.id).await;
        assert!(streamer.drain().is_empty());
        assert_consistent(&mediator).await;
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_messages() {
        let mediator = mediator();
        let mut client = connect(&mediator).await;

        mediator.handle_text(&client.id, "{not json").await;
        assert_eq!(
            client.drain(),
            vec![json!({"type": "error", "message": "Invalid message format"})]
        );

        send(&mediator, &client, json!({"type": "offer", "offer": {}})).await;
        assert_eq!(
            client.drain(),
            vec![json!({"type": "error", "message": "Invalid message format"})]
        );

        send(&mediator, &client, json!({"type": "keepalive"})).await;
        assert!(client.drain().is_empty());

        assert_eq!(mediator.metrics().malformed, 2);
        assert_eq!(
            mediator.connection_role(&client.id).await,
            Some((Role::Unassigned, None))
        );
    }

    #[tokio::test]
    async fn test_reregistration_takes_over_viewers() {
        let mediator = mediator();
        let first = streamer(&mediator, "cam-1").await;
        let mut v1 = viewer(&mediator, "cam-1").await;

        let mut second = connect(&mediator).await;
        send(
            &mediator,
            &second,
            json!({"type": "register-streamer", "streamId": "cam-1"}),
        )
        .await;

        let messages = second.drain();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["type"], "registered");
        assert_eq!(
            messages[1],
            json!({"type": "viewer-joined", "viewerId": v1.id.as_str()})
        );
        assert_consistent(&mediator).await;

        // The displaced streamer no longer controls the stream
        mediator.disconnect(&first.id).await;
        assert!(v1.drain().is_empty());
        let viewers = mediator
            .stream_viewers(&StreamId::new("cam-1"))
            .await
            .unwrap();
        assert!(viewers.contains(&v1.id));
    }

    #[tokio::test]
    async fn test_returning_streamer_adopts_waiting_viewers() {
        let mediator = mediator();
        let first = streamer(&mediator, "cam-1").await;
        let mut v1 = viewer(&mediator, "cam-1").await;

        mediator.disconnect(&first.id).await;
        assert_eq!(v1.drain(), vec![json!({"type": "stream-ended"})]);

        let mut second = connect(&mediator).await;
        mediator
            .register_streamer(&second.id, Some(StreamId::new("cam-1")))
            .await
            .unwrap();

        let messages = second.drain();
        assert_eq!(
            messages.last().unwrap(),
            &json!({"type": "viewer-joined", "viewerId": v1.id.as_str()})
        );
        assert_consistent(&mediator).await;
    }

    #[tokio::test]
    async fn test_closed_viewer_does_not_block_broadcast() {
        let mediator = mediator();
        let streamer = streamer(&mediator, "cam-1").await;
        let gone = viewer(&mediator, "cam-1").await;
        let mut alive = viewer(&mediator, "cam-1").await;
        drop(gone);

        let notified = mediator.stop_stream(&streamer.id).await;

        assert_eq!(notified, 1);
        assert_eq!(alive.drain(), vec![json!({"type": "stream-ended"})]);
    }

    #[tokio::test]
    async fn test_full_queue_drops_frames() {
        let mediator = mediator();
        let streamer = streamer(&mediator, "cam-1").await;

        let (channel, mut rx) = ClientChannel::pair(1);
        let slow = mediator.accept(channel).await;
        mediator
            .register_viewer(&slow, Some(StreamId::new("cam-1")))
            .await
            .unwrap();

        // `connected` filled the only slot, so `registered` overflowed
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert_eq!(mediator.metrics().overflowed, 1);

        assert_eq!(mediator.stop_stream(&streamer.id).await, 1);
    }

    #[tokio::test]
    async fn test_viewer_sets_stay_consistent() {
        let mediator = mediator();
        let mut clients: Vec<TestClient> = Vec::new();
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;

        for _ in 0..300 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;

            let stream = format!("cam-{}", seed % 3);
            match (seed >> 8) % 4 {
                0 => clients.push(connect(&mediator).await),
                1 if !clients.is_empty() => {
                    let idx = (seed >> 16) as usize % clients.len();
                    let _ = mediator
                        .register_streamer(&clients[idx].id, Some(StreamId::new(stream)))
                        .await;
                }
                2 if !clients.is_empty() => {
                    let idx = (seed >> 16) as usize % clients.len();
                    let _ = mediator
                        .register_viewer(&clients[idx].id, Some(StreamId::new(stream)))
                        .await;
                }
                3 if !clients.is_empty() => {
                    let idx = (seed >> 16) as usize % clients.len();
                    let client = clients.swap_remove(idx);
                    mediator.disconnect(&client.id).await;
                }
                _ => {}
            }

            for client in clients.iter_mut() {
                client.drain();
            }
            assert_consistent(&mediator).await;
        }
    }
}
