//! In-flight event shapes: chunks while a producer is still writing an
//! event, and the finalized form handed to final subscribers.

use chrono::{DateTime, Utc};
use json_patch::Patch;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use mur_domain::ids::EventId;
use mur_domain::session::{EventSource, EventType};

/// A partial update to a still-being-produced event, expressed as JSON-Patch
/// operations against the event's data document.
///
/// `seq` is strictly monotonic per `(correlation_id, event_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkEvent {
    pub correlation_id: String,
    pub event_id: EventId,
    pub seq: u64,
    pub patches: Patch,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// A finalized event: either an immediately-emitted status or the folded
/// result of a chunk sequence. Not yet persisted — the SSE bridge writes it
/// to the session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmittedEvent {
    pub id: EventId,
    pub correlation_id: String,
    pub source: EventSource,
    #[serde(rename = "type")]
    pub kind: EventType,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    pub created_at: DateTime<Utc>,
}
