//! Text frame codec
//!
//! Decoding is done in two steps so failures can be classified: a frame that is
//! not JSON (or has no `type`) is malformed, a frame with an unrecognised `type`
//! is merely unknown and gets ignored by the receiver.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ProtocolError;

use super::message::{ClientMessage, ServerMessage};

/// Tagged message enums that carry a catch-all `Unknown` variant
pub trait Envelope: Serialize + DeserializeOwned {
    /// Whether this is the catch-all variant
    fn is_unknown(&self) -> bool;

    /// Offer, answer or candidate payload, if this message carries one
    fn payload(&self) -> Option<&Value>;
}

impl Envelope for ClientMessage {
    fn is_unknown(&self) -> bool {
        matches!(self, ClientMessage::Unknown)
    }

    fn payload(&self) -> Option<&Value> {
        match self {
            ClientMessage::Offer { offer, .. } => Some(offer),
            ClientMessage::Answer { answer, .. } => Some(answer),
            ClientMessage::IceCandidate { candidate, .. } => Some(candidate),
            _ => None,
        }
    }
}

impl Envelope for ServerMessage {
    fn is_unknown(&self) -> bool {
        matches!(self, ServerMessage::Unknown)
    }

    fn payload(&self) -> Option<&Value> {
        match self {
            ServerMessage::Offer { offer, .. } => Some(offer),
            ServerMessage::Answer { answer, .. } => Some(answer),
            ServerMessage::IceCandidate { candidate, .. } => Some(candidate),
            _ => None,
        }
    }
}

/// Decode one text frame
///
/// A relay message whose payload is `null` counts as missing its payload.
pub fn decode<M: Envelope>(text: &str) -> Result<M, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?
        .to_owned();

    match M::deserialize(value) {
        Ok(msg) if msg.is_unknown() => Err(ProtocolError::UnknownType(kind)),
        Ok(msg) if msg.payload().is_some_and(Value::is_null) => {
            Err(ProtocolError::InvalidFields {
                kind,
                reason: "payload is null".into(),
            })
        }
        Ok(msg) => Ok(msg),
        Err(e) => Err(ProtocolError::InvalidFields {
            kind,
            reason: e.to_string(),
        }),
    }
}

/// Encode a message into a shareable outbound frame
pub fn encode<M: Serialize>(msg: &M) -> Result<OutboundFrame, ProtocolError> {
    serde_json::to_vec(msg)
        .map(|buf| OutboundFrame(Bytes::from(buf)))
        .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
}

/// An encoded JSON text frame
///
/// Cloning is cheap: a broadcast to many recipients shares one allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame(Bytes);

impl OutboundFrame {
    /// Frame contents as text
    pub fn as_str(&self) -> &str {
        // Produced by serde_json, so always UTF-8
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// Copy the frame into an owned websocket text payload
    pub fn into_text(self) -> String {
        self.as_str().to_owned()
    }

    /// Raw encoded bytes
    pub fn bytes(&self) -> &Bytes {
        &self.0
    }

    /// Encoded length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the frame is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
