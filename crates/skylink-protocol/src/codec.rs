//! Codec trait and implementations for turning envelopes into frames.
//!
//! The connection layer never touches JSON directly: it hands an
//! [`Envelope`] to a [`Codec`] and gets a text frame back, and the other
//! way round for inbound frames. [`JsonCodec`] is the only format the
//! backend speaks today.

use serde_json::Value;

use crate::{Envelope, ProtocolError};

/// Converts between [`Envelope`]s and text frames.
///
/// ## Why not generic methods?
///
/// The router stores its codec as `Box<dyn Codec>` so tests can swap in a
/// different one. Trait objects can't have generic methods, so the codec
/// is specialised to `Envelope` rather than any `T: Serialize`.
pub trait Codec: Send + Sync + 'static {
    /// Serializes an envelope into a text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the payload can't be represented.
    fn encode(&self, envelope: &Envelope) -> Result<String, ProtocolError>;

    /// Parses a text frame into an envelope.
    ///
    /// # Errors
    /// Returns `ProtocolError::Malformed` for anything that isn't a
    /// well-formed envelope, and `ProtocolError::MissingType` for a JSON
    /// object without a usable `type` string.
    fn decode(&self, frame: &str) -> Result<Envelope, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use serde_json::json;
/// use skylink_protocol::{Codec, Envelope, JsonCodec, MessageKind};
///
/// let codec = JsonCodec;
/// let frame = codec
///     .encode(&Envelope::new(MessageKind::Ping, json!(null)))
///     .unwrap();
/// assert_eq!(frame, r#"{"type":"ping"}"#);
///
/// let env = codec.decode(r#"{"type":"risk_alert","data":{"level":3}}"#).unwrap();
/// assert_eq!(env.kind(), &MessageKind::RiskAlert);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, envelope: &Envelope) -> Result<String, ProtocolError> {
        serde_json::to_string(envelope).map_err(ProtocolError::Encode)
    }

    fn decode(&self, frame: &str) -> Result<Envelope, ProtocolError> {
        // Two passes so a missing `type` is reported as such instead of
        // as a generic serde "missing field" error.
        let value: Value =
            serde_json::from_str(frame).map_err(ProtocolError::Malformed)?;

        match value.get("type") {
            Some(Value::String(kind)) if !kind.is_empty() => {}
            _ => return Err(ProtocolError::MissingType),
        }

        serde_json::from_value(value).map_err(ProtocolError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MessageKind, RoomId};
    use serde_json::json;

    #[test]
    fn test_encode_produces_compact_json() {
        let env = Envelope::new(MessageKind::ChatMessage, json!({"text": "hi"}))
            .with_room(RoomId::mission("m-1"));
        let frame = JsonCodec.encode(&env).unwrap();

        let parsed: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            parsed,
            json!({"type": "chat_message", "data": {"text": "hi"}, "id": "mission:m-1"})
        );
    }

    #[test]
    fn test_decode_known_and_unknown_kinds() {
        let env = JsonCodec
            .decode(r#"{"type":"agent_status_update","data":{"status":"idle"},"agent_id":"a-1"}"#)
            .unwrap();
        assert_eq!(env.kind(), &MessageKind::AgentStatusUpdate);
        assert_eq!(env.data()["status"], "idle");
        assert_eq!(env.room(), Some(RoomId::agent("a-1")));

        let env = JsonCodec.decode(r#"{"type":"solar_flare"}"#).unwrap();
        assert_eq!(env.kind(), &MessageKind::Other("solar_flare".into()));
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        let err = JsonCodec.decode("{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_decode_rejects_non_object() {
        assert!(matches!(
            JsonCodec.decode("[1, 2, 3]").unwrap_err(),
            ProtocolError::MissingType
        ));
        assert!(matches!(
            JsonCodec.decode("\"ping\"").unwrap_err(),
            ProtocolError::MissingType
        ));
    }

    #[test]
    fn test_decode_rejects_missing_or_empty_type() {
        for frame in [r#"{"data":{}}"#, r#"{"type":""}"#, r#"{"type":7}"#] {
            assert!(
                matches!(JsonCodec.decode(frame).unwrap_err(), ProtocolError::MissingType),
                "frame {frame} should be MissingType"
            );
        }
    }

    #[test]
    fn test_decode_rejects_wrongly_typed_fields() {
        // `timestamp` must be a string when present.
        let err = JsonCodec.decode(r#"{"type":"ping","timestamp":12}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_decode_server_heartbeat() {
        let env = JsonCodec
            .decode(r#"{"type":"heartbeat","timestamp":"2024-05-01T12:00:00.5","active_connections":4}"#)
            .unwrap();
        assert_eq!(env.kind(), &MessageKind::Heartbeat);
        assert_eq!(env.field("active_connections"), Some(&json!(4)));
        assert!(env.timestamp_utc().is_some());
    }
}
