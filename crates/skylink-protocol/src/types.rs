//! Core protocol types for Skylink's wire format.
//!
//! Every frame on the socket is a JSON object with a required `type`
//! string and optional `data`, `timestamp` and `id` fields. The backend
//! also attaches entity fields such as `mission_id` or `agent_id` at the
//! top level; those are kept verbatim in [`Envelope::field`].

use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// The routing key of an envelope: its `type` field.
///
/// Known types get their own variant so listeners can match on them
/// without string comparisons. Anything else the backend invents is kept
/// as [`MessageKind::Other`] and is still routable.
///
/// On the wire every kind is a plain snake_case string. Build kinds with
/// `MessageKind::from(..)`, which maps known names to their variant;
/// `Other` never holds a known name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    /// Liveness ping. Reserved: never delivered to listeners.
    Ping,
    /// Liveness acknowledgement. Reserved: never delivered to listeners.
    Pong,
    /// Periodic server broadcast carrying the active connection count.
    Heartbeat,
    MissionUpdate,
    AgentStatusUpdate,
    TelemetryUpdate,
    RiskAlert,
    BlockchainUpdate,
    SystemAlert,
    ChatMessage,
    VoiceCommand,
    /// Client → server: join a mission room.
    SubscribeMission,
    /// Client → server: join an agent room.
    SubscribeAgent,
    /// Client → server: leave a room.
    Unsubscribe,
    /// Server → client: a room join was accepted.
    SubscriptionConfirmed,
    /// Server → client: a room leave was accepted.
    UnsubscriptionConfirmed,
    /// Any type this client has no variant for.
    Other(String),
}

impl MessageKind {
    /// The wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Heartbeat => "heartbeat",
            Self::MissionUpdate => "mission_update",
            Self::AgentStatusUpdate => "agent_status_update",
            Self::TelemetryUpdate => "telemetry_update",
            Self::RiskAlert => "risk_alert",
            Self::BlockchainUpdate => "blockchain_update",
            Self::SystemAlert => "system_alert",
            Self::ChatMessage => "chat_message",
            Self::VoiceCommand => "voice_command",
            Self::SubscribeMission => "subscribe_mission",
            Self::SubscribeAgent => "subscribe_agent",
            Self::Unsubscribe => "unsubscribe",
            Self::SubscriptionConfirmed => "subscription_confirmed",
            Self::UnsubscriptionConfirmed => "unsubscription_confirmed",
            Self::Other(name) => name,
        }
    }

    /// `true` for the heartbeat pair, which the connection layer consumes.
    pub fn is_reserved(&self) -> bool {
        matches!(self, Self::Ping | Self::Pong)
    }

    fn known(name: &str) -> Option<Self> {
        Some(match name {
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "heartbeat" => Self::Heartbeat,
            "mission_update" => Self::MissionUpdate,
            "agent_status_update" => Self::AgentStatusUpdate,
            "telemetry_update" => Self::TelemetryUpdate,
            "risk_alert" => Self::RiskAlert,
            "blockchain_update" => Self::BlockchainUpdate,
            "system_alert" => Self::SystemAlert,
            "chat_message" => Self::ChatMessage,
            "voice_command" => Self::VoiceCommand,
            "subscribe_mission" => Self::SubscribeMission,
            "subscribe_agent" => Self::SubscribeAgent,
            "unsubscribe" => Self::Unsubscribe,
            "subscription_confirmed" => Self::SubscriptionConfirmed,
            "unsubscription_confirmed" => Self::UnsubscriptionConfirmed,
            _ => return None,
        })
    }
}

impl From<&str> for MessageKind {
    fn from(name: &str) -> Self {
        Self::known(name).unwrap_or_else(|| Self::Other(name.to_owned()))
    }
}

impl From<String> for MessageKind {
    fn from(name: String) -> Self {
        Self::known(&name).unwrap_or(Self::Other(name))
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Other(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RoomId
// ---------------------------------------------------------------------------

/// A room (entity) an envelope belongs to, e.g. `"mission:m-42"`.
///
/// The client-side form is `<entity>:<id>`. The backend names the same
/// rooms `<entity>_<id>`; [`RoomId::backend_name`] and
/// [`RoomId::from_backend_name`] convert between the two.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Wraps an already-formed room id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The room of one mission.
    pub fn mission(id: impl fmt::Display) -> Self {
        Self(format!("mission:{id}"))
    }

    /// The room of one agent.
    pub fn agent(id: impl fmt::Display) -> Self {
        Self(format!("agent:{id}"))
    }

    /// Parses the backend's `mission_<id>` / `agent_<id>` naming.
    ///
    /// Names without a known prefix are taken as-is.
    pub fn from_backend_name(name: &str) -> Self {
        match name.split_once('_') {
            Some((entity @ ("mission" | "agent"), id)) => {
                Self(format!("{entity}:{id}"))
            }
            _ => Self(name.to_owned()),
        }
    }

    /// The backend's name for this room (`mission:7` → `mission_7`).
    pub fn backend_name(&self) -> String {
        self.0.replacen(':', "_", 1)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One unit of data on the connection, inbound or outbound.
///
/// Envelopes are immutable once built: the builder methods consume and
/// return `self`, and there are no setters.
///
/// ```
/// use serde_json::json;
/// use skylink_protocol::{Envelope, MessageKind, RoomId};
///
/// let env = Envelope::new(MessageKind::ChatMessage, json!({"text": "hi"}))
///     .with_room(RoomId::mission("m-1"));
/// assert_eq!(env.kind(), &MessageKind::ChatMessage);
/// assert_eq!(env.room(), Some(RoomId::mission("m-1")));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    kind: MessageKind,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    data: Value,

    /// ISO-8601. Kept as the sender wrote it; see [`Envelope::timestamp_utc`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RoomId>,

    /// Top-level fields this struct has no slot for (`mission_id`, ...).
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Envelope {
    /// Creates an envelope with no timestamp, room or extra fields.
    pub fn new(kind: impl Into<MessageKind>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp: None,
            id: None,
            extra: Map::new(),
        }
    }

    /// Scopes the envelope to a room (sets the `id` field).
    pub fn with_room(mut self, room: RoomId) -> Self {
        self.id = Some(room);
        self
    }

    /// Sets an explicit timestamp.
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Adds an extra top-level field. Reserved names are ignored.
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        if !matches!(key, "type" | "data" | "timestamp" | "id") {
            self.extra.insert(key.to_owned(), value.into());
        }
        self
    }

    /// Stamps the current UTC time if no timestamp is set.
    ///
    /// Uses the same shape as JavaScript's `toISOString()`:
    /// `2024-05-01T12:00:00.000Z`.
    pub fn ensure_timestamp(mut self) -> Self {
        if self.timestamp.is_none() {
            self.timestamp =
                Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
        }
        self
    }

    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    /// The explicit `id` field, if any. See [`Envelope::room`] for routing.
    pub fn id(&self) -> Option<&RoomId> {
        self.id.as_ref()
    }

    /// An extra top-level field, e.g. `field("active_connections")`.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// The room this envelope is routed to.
    ///
    /// The explicit `id` wins. Otherwise the backend's entity fields are
    /// consulted in order: `mission_id`, `agent_id`, then `room_id`
    /// (which uses the backend's `mission_<id>` naming).
    pub fn room(&self) -> Option<RoomId> {
        if let Some(id) = &self.id {
            return Some(id.clone());
        }
        if let Some(id) = self.scalar_field("mission_id") {
            return Some(RoomId::mission(id));
        }
        if let Some(id) = self.scalar_field("agent_id") {
            return Some(RoomId::agent(id));
        }
        self.scalar_field("room_id")
            .map(|name| RoomId::from_backend_name(&name))
    }

    /// `true` if this acknowledges a heartbeat ping.
    ///
    /// Besides a plain `pong`, older backends answer with a
    /// `system_alert` whose `data.type` is `"pong"`.
    pub fn is_heartbeat_ack(&self) -> bool {
        match &self.kind {
            MessageKind::Pong => true,
            MessageKind::SystemAlert => {
                self.data.get("type").and_then(Value::as_str) == Some("pong")
            }
            _ => false,
        }
    }

    /// Parses the timestamp as UTC.
    ///
    /// Accepts RFC 3339 and offset-less ISO-8601 (as Python's
    /// `datetime.isoformat()` emits), the latter read as UTC.
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.timestamp.as_deref()?;
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    fn scalar_field(&self, key: &str) -> Option<String> {
        match self.extra.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
