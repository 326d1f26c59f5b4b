//! Signaling message types
//!
//! Every frame is a JSON object tagged by `type`. Offer, answer and candidate
//! payloads are carried as opaque [`Value`]s: the mediator forwards them
//! untouched and only the negotiation drivers interpret them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::{ConnectionId, Role, StreamId};

/// Messages sent by an endpoint to the mediator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Publish a stream, optionally under a caller-chosen id
    #[serde(rename_all = "camelCase")]
    RegisterStreamer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<StreamId>,
    },

    /// Watch an existing stream
    #[serde(rename_all = "camelCase")]
    RegisterViewer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<StreamId>,
    },

    /// Session description offer for `target_id`
    #[serde(rename_all = "camelCase")]
    Offer { offer: Value, target_id: ConnectionId },

    /// Session description answer for `target_id`
    #[serde(rename_all = "camelCase")]
    Answer { answer: Value, target_id: ConnectionId },

    /// ICE candidate for `target_id`
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        candidate: Value,
        target_id: ConnectionId,
    },

    /// End the caller's stream
    StopStream,

    /// Any `type` this version does not know
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Wire name of this message
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::RegisterStreamer { .. } => "register-streamer",
            ClientMessage::RegisterViewer { .. } => "register-viewer",
            ClientMessage::Offer { .. } => "offer",
            ClientMessage::Answer { .. } => "answer",
            ClientMessage::IceCandidate { .. } => "ice-candidate",
            ClientMessage::StopStream => "stop-stream",
            ClientMessage::Unknown => "unknown",
        }
    }
}

/// Messages sent by the mediator to an endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Connection accepted; carries the id other peers will address it by
    #[serde(rename_all = "camelCase")]
    Connected { client_id: ConnectionId },

    /// Registration succeeded
    #[serde(rename_all = "camelCase")]
    Registered {
        role: Role,
        stream_id: StreamId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        embed_url: Option<String>,
    },

    /// Relayed offer
    #[serde(rename_all = "camelCase")]
    Offer { offer: Value, sender_id: ConnectionId },

    /// Relayed answer
    #[serde(rename_all = "camelCase")]
    Answer { answer: Value, sender_id: ConnectionId },

    /// Relayed ICE candidate
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        candidate: Value,
        sender_id: ConnectionId,
    },

    /// A viewer joined the streamer's stream
    #[serde(rename_all = "camelCase")]
    ViewerJoined { viewer_id: ConnectionId },

    /// A viewer left the streamer's stream
    #[serde(rename_all = "camelCase")]
    ViewerLeft { viewer_id: ConnectionId },

    /// The stream the viewer was watching is gone
    StreamEnded,

    /// Request could not be served
    Error { message: String },

    /// Any `type` this version does not know
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Build an `error` message
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Wire name of this message
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::Registered { .. } => "registered",
            ServerMessage::Offer { .. } => "offer",
            ServerMessage::Answer { .. } => "answer",
            ServerMessage::IceCandidate { .. } => "ice-candidate",
            ServerMessage::ViewerJoined { .. } => "viewer-joined",
            ServerMessage::ViewerLeft { .. } => "viewer-left",
            ServerMessage::StreamEnded => "stream-ended",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Unknown => "unknown",
        }
    }
}
