//! Negotiation payloads
//!
//! Endpoints disagree on framing: browsers send `{type, sdp}` objects, some
//! native clients send the same object pre-serialized as a JSON string, and a
//! few send the bare SDP text. The helpers here accept all three.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ProtocolError;

/// Session description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

impl SdpType {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
            SdpType::Pranswer => "pranswer",
            SdpType::Rollback => "rollback",
        }
    }
}

/// Session description (offer or answer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// Interpret a relayed payload
    ///
    /// `fallback` is used when the payload does not say which kind it is
    /// (bare SDP text, or an object without `type`).
    pub fn from_payload(payload: &Value, fallback: SdpType) -> Result<Self, ProtocolError> {
        match payload {
            Value::Object(_) => Self::from_object(payload, fallback),
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(inner @ Value::Object(_)) => Self::from_object(&inner, fallback),
                _ if text.trim_start().starts_with("v=") => Ok(Self {
                    kind: fallback,
                    sdp: text.clone(),
                }),
                _ => Err(ProtocolError::InvalidPayload(
                    "session description string is neither JSON nor SDP".into(),
                )),
            },
            other => Err(ProtocolError::InvalidPayload(format!(
                "session description must be an object or string, got {}",
                json_kind(other)
            ))),
        }
    }

    fn from_object(object: &Value, fallback: SdpType) -> Result<Self, ProtocolError> {
        let sdp = object
            .get("sdp")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::InvalidPayload("missing 'sdp'".into()))?;

        let kind = match object.get("type") {
            None | Some(Value::Null) => fallback,
            Some(kind) => SdpType::deserialize(kind)
                .map_err(|e| ProtocolError::InvalidPayload(format!("bad 'type': {}", e)))?,
        };

        Ok(Self {
            kind,
            sdp: sdp.to_owned(),
        })
    }

    /// Wire representation
    pub fn to_payload(&self) -> Value {
        json!({ "type": self.kind.as_str(), "sdp": self.sdp })
    }
}

/// ICE candidate as exchanged by browsers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    /// Create a candidate bound to a media section
    pub fn new(candidate: impl Into<String>, sdp_mid: Option<String>, index: Option<u16>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid,
            sdp_mline_index: index,
            username_fragment: None,
        }
    }

    /// Interpret a relayed payload (object or JSON string)
    pub fn from_payload(payload: &Value) -> Result<Self, ProtocolError> {
        let parsed = match payload {
            Value::Object(_) => IceCandidate::deserialize(payload),
            Value::String(text) => serde_json::from_str(text),
            other => {
                return Err(ProtocolError::InvalidPayload(format!(
                    "candidate must be an object or string, got {}",
                    json_kind(other)
                )))
            }
        };

        parsed.map_err(|e| ProtocolError::InvalidPayload(format!("bad candidate: {}", e)))
    }

    /// Wire representation
    pub fn to_payload(&self) -> Value {
        let mut payload = json!({ "candidate": self.candidate });
        if let Some(mid) = &self.sdp_mid {
            payload["sdpMid"] = json!(mid);
        }
        if let Some(index) = self.sdp_mline_index {
            payload["sdpMLineIndex"] = json!(index);
        }
        if let Some(ufrag) = &self.username_fragment {
            payload["usernameFragment"] = json!(ufrag);
        }
        payload
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_from_object() {
        let payload = json!({"type": "answer", "sdp": "v=0\r\n"});
        let desc = SessionDescription::from_payload(&payload, SdpType::Offer).unwrap();

        assert_eq!(desc, SessionDescription::answer("v=0\r\n"));
        assert_eq!(desc.to_payload(), payload);
    }

    #[test]
    fn test_description_from_serialized_string() {
        // Native clients send the object pre-serialized
        let payload = json!("{\"type\":\"offer\",\"sdp\":\"v=0\\r\\n\"}");
        let desc = SessionDescription::from_payload(&payload, SdpType::Answer).unwrap();

        assert_eq!(desc, SessionDescription::offer("v=0\r\n"));
    }

    #[test]
    fn test_description_from_bare_sdp() {
        let payload = json!("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\n");
        let desc = SessionDescription::from_payload(&payload, SdpType::Answer).unwrap();

        assert_eq!(desc.kind, SdpType::Answer);
        assert!(desc.sdp.starts_with("v=0"));
    }

    #[test]
    fn test_description_rejects_garbage() {
        assert!(SessionDescription::from_payload(&json!(7), SdpType::Offer).is_err());
        assert!(SessionDescription::from_payload(&json!("hello"), SdpType::Offer).is_err());
        assert!(SessionDescription::from_payload(&json!({"type": "offer"}), SdpType::Offer).is_err());
        assert!(
            SessionDescription::from_payload(&json!({"type": "bogus", "sdp": "v=0"}), SdpType::Offer)
                .is_err()
        );
    }

    #[test]
    fn test_candidate_shapes() {
        let object = json!({
            "candidate": "candidate:1 1 udp 2122260223 192.168.1.4 54400 typ host",
            "sdpMid": "0",
            "sdpMLineIndex": 0,
        });
        let from_object = IceCandidate::from_payload(&object).unwrap();
        assert_eq!(from_object.sdp_mid.as_deref(), Some("0"));
        assert_eq!(from_object.sdp_mline_index, Some(0));
        assert_eq!(from_object.to_payload(), object);

        let from_string = IceCandidate::from_payload(&json!(object.to_string())).unwrap();
        assert_eq!(from_string, from_object);
    }

    #[test]
    fn test_candidate_malformed() {
        assert!(IceCandidate::from_payload(&json!({"sdpMid": "0"})).is_err());
        assert!(IceCandidate::from_payload(&json!("not json")).is_err());
        assert!(IceCandidate::from_payload(&json!(null)).is_err());
    }
}
