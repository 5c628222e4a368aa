//! Sessions and their append-only event log.
//!
//! A session ties one user to one agent. Every turn appends events to the
//! session's log; `offset` is the zero-based, gap-free position of an event
//! within its session, assigned at append time.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::ids::{AgentId, EventId, SessionId, UserId};

/// Key of a `consumption_offsets` entry — the consumer that acknowledged
/// events up to the stored offset. The default consumer is `"client"`.
pub type ConsumerId = String;

pub const CLIENT_CONSUMER: &str = "client";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    Auto,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub agent_id: AgentId,
    #[serde(default)]
    pub mode: SessionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Highest event offset each consumer has acknowledged.
    pub consumption_offsets: BTreeMap<ConsumerId, u64>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// The initial offsets map for a freshly created session.
    pub fn initial_offsets() -> BTreeMap<ConsumerId, u64> {
        BTreeMap::from([(CLIENT_CONSUMER.to_owned(), 0)])
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Who produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    User,
    AiAgent,
    HumanAgent,
    HumanAgentOnBehalfOfAiAgent,
    System,
}

/// The payload family of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Message,
    Status,
    Tool,
    Custom,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Status => "status",
            Self::Tool => "tool",
            Self::Custom => "custom",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "message" => Ok(Self::Message),
            "status" => Ok(Self::Status),
            "tool" => Ok(Self::Tool),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// A persisted event in a session's append-only log.
///
/// `data` is the serialized payload (see [`EventData`]); finalized streaming
/// events carry whatever document their chunks folded into, so the field is
/// kept as raw JSON rather than a closed enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub source: EventSource,
    #[serde(rename = "type")]
    pub kind: EventType,
    pub offset: u64,
    pub correlation_id: String,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
}

/// One piece of a message body. `content` is the only variant today; the
/// tagging leaves room for richer parts (attachments, citations).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Content { content: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEventData {
    pub participant: Participant,
    pub parts: Vec<ContentPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flagged: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
}

/// Lifecycle states reported through `status` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Typing,
    Processing,
    Ready,
    Cancelled,
    Completed,
    Error,
}

impl SessionStatus {
    /// A terminal status ends its correlation: no further events may be
    /// emitted under it.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEventData {
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl StatusEventData {
    pub fn new(status: SessionStatus) -> Self {
        Self {
            status,
            acknowledged_offset: None,
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    pub arguments: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEventData {
    pub tool_calls: Vec<ToolCall>,
}

/// Tagged union of the well-known payloads. Serializes with a `"type"` tag
/// matching the event's [`EventType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventData {
    Message(MessageEventData),
    Status(StatusEventData),
    Tool(ToolEventData),
}

impl EventData {
    pub fn kind(&self) -> EventType {
        match self {
            Self::Message(_) => EventType::Message,
            Self::Status(_) => EventType::Status,
            Self::Tool(_) => EventType::Tool,
        }
    }

    pub fn into_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Persistence contract for sessions and their event logs.
///
/// Implementations must serialize `create_event` per session so that offsets
/// stay gap-free, and must make `delete_session` atomic (events first, then
/// the session record).
#[async_trait]
pub trait SessionStore: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn create_session(
        &self,
        user_id: UserId,
        agent_id: AgentId,
        id: Option<SessionId>,
        mode: Option<SessionMode>,
        title: Option<String>,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<Session>;

    async fn read_session(&self, session_id: &SessionId) -> Result<Option<Session>>;

    /// Remove a session and all of its events. Returns whether it existed.
    async fn delete_session(&self, session_id: &SessionId) -> Result<bool>;

    /// List sessions matching the AND of the provided filters.
    async fn list_sessions(
        &self,
        agent_id: Option<&AgentId>,
        user_id: Option<&UserId>,
    ) -> Result<Vec<Session>>;

    /// Append an event. The offset is the count of non-deleted events in the
    /// session at append time. Fails when the session does not exist.
    #[allow(clippy::too_many_arguments)]
    async fn create_event(
        &self,
        session_id: &SessionId,
        source: EventSource,
        kind: EventType,
        correlation_id: &str,
        data: Value,
        metadata: Option<Map<String, Value>>,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<Event>;

    async fn read_event(
        &self,
        session_id: &SessionId,
        event_id: &EventId,
    ) -> Result<Option<Event>>;

    /// List events in insertion order. `types` empty means all types.
    #[allow(clippy::too_many_arguments)]
    async fn list_events(
        &self,
        session_id: &SessionId,
        source: Option<EventSource>,
        correlation_id: Option<&str>,
        types: &[EventType],
        min_offset: Option<u64>,
        exclude_deleted: bool,
    ) -> Result<Vec<Event>>;

    /// Flag an event as deleted. Returns whether it existed.
    async fn delete_event(&self, event_id: &EventId) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_source_snake_case() {
        assert_eq!(
            serde_json::to_string(&EventSource::AiAgent).unwrap(),
            "\"ai_agent\""
        );
        assert_eq!(
            serde_json::to_string(&EventSource::HumanAgentOnBehalfOfAiAgent).unwrap(),
            "\"human_agent_on_behalf_of_ai_agent\""
        );
    }

    #[test]
    fn event_type_parse_roundtrip() {
        for kind in [
            EventType::Message,
            EventType::Status,
            EventType::Tool,
            EventType::Custom,
        ] {
            assert_eq!(kind.as_str().parse::<EventType>().unwrap(), kind);
        }
        assert!("bogus".parse::<EventType>().is_err());
    }

    #[test]
    fn message_payload_carries_type_tag() {
        let data = EventData::Message(MessageEventData {
            participant: Participant {
                id: "v9pg5Zv3h4".into(),
                name: "John Doe".into(),
            },
            parts: vec![ContentPart::Content {
                content: "What's the weather in SF?".into(),
            }],
            flagged: Some(false),
            tags: None,
        });

        let value = data.into_value();
        assert_eq!(value["type"], "message");
        assert_eq!(value["parts"][0]["type"], "content");
        assert_eq!(value["parts"][0]["content"], "What's the weather in SF?");
        assert_eq!(value["participant"]["name"], "John Doe");
    }

    #[test]
    fn status_payload_omits_absent_fields() {
        let value = EventData::Status(StatusEventData::new(SessionStatus::Typing)).into_value();
        assert_eq!(value, json!({"type": "status", "status": "typing"}));
    }

    #[test]
    fn status_terminality() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(!SessionStatus::Typing.is_terminal());
        assert!(!SessionStatus::Processing.is_terminal());
        assert!(!SessionStatus::Ready.is_terminal());
        assert!(!SessionStatus::Error.is_terminal());
    }

    #[test]
    fn tool_payload_roundtrip() {
        let data = EventData::Tool(ToolEventData {
            tool_calls: vec![ToolCall {
                tool_name: "search".into(),
                arguments: json!({"q": "weather sf"}),
                result: None,
            }],
        });
        let value = data.clone().into_value();
        assert_eq!(value["type"], "tool");

        let back: EventData = serde_json::from_value(value).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn event_serializes_kind_as_type() {
        let event = Event {
            id: EventId::from("e936e0ba12"),
            source: EventSource::User,
            kind: EventType::Message,
            offset: 0,
            correlation_id: "RID(abc)::def".into(),
            data: json!({"type": "message"}),
            metadata: None,
            deleted: false,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["source"], "user");
        assert!(value.get("kind").is_none());
    }

    #[test]
    fn initial_offsets_default_client() {
        let offsets = Session::initial_offsets();
        assert_eq!(offsets.get(CLIENT_CONSUMER), Some(&0));
        assert_eq!(offsets.len(), 1);
    }
}
