//! Chunk accumulation keyed by `(correlation_id, event_id)`.
//!
//! Chunks arrive as JSON-Patch fragments; finalization folds them in `seq`
//! order over an empty document and purges the bucket.

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use mur_domain::error::{Error, Result};
use mur_domain::ids::EventId;
use mur_domain::session::{EventSource, EventType};

use crate::types::{ChunkEvent, EmittedEvent};

type BucketKey = (String, EventId);

/// In-memory chunk store.
#[derive(Default)]
pub struct MemoryEventStore {
    buckets: Mutex<HashMap<BucketKey, Vec<ChunkEvent>>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The seq the next chunk for this event must carry.
    pub fn next_seq(&self, correlation_id: &str, event_id: &EventId) -> u64 {
        let buckets = self.buckets.lock();
        buckets
            .get(&(correlation_id.to_owned(), event_id.clone()))
            .map_or(0, |chunks| chunks.len() as u64)
    }

    /// Append a chunk. Out-of-order `seq` values are rejected with
    /// [`Error::SequenceViolation`].
    pub fn add_chunk(&self, chunk: ChunkEvent) -> Result<()> {
        let mut buckets = self.buckets.lock();
        let chunks = buckets
            .entry((chunk.correlation_id.clone(), chunk.event_id.clone()))
            .or_default();

        let expected = chunks.len() as u64;
        if chunk.seq != expected {
            return Err(Error::SequenceViolation {
                event_id: chunk.event_id.clone(),
                expected,
                got: chunk.seq,
            });
        }
        chunks.push(chunk);
        Ok(())
    }

    /// Fold the chunk sequence for an event into its final form and purge
    /// the bucket. Returns `None` when no chunks exist for the key.
    pub fn finalize_event(
        &self,
        correlation_id: &str,
        event_id: &EventId,
    ) -> Result<Option<EmittedEvent>> {
        let chunks = {
            let mut buckets = self.buckets.lock();
            match buckets.remove(&(correlation_id.to_owned(), event_id.clone())) {
                Some(chunks) => chunks,
                None => return Ok(None),
            }
        };

        let mut data = json!({});
        let mut metadata = Map::new();
        for chunk in &chunks {
            json_patch::patch(&mut data, &chunk.patches).map_err(|e| {
                Error::Other(format!(
                    "applying chunk seq {} for event {}: {e}",
                    chunk.seq, chunk.event_id
                ))
            })?;
            metadata.extend(chunk.metadata.clone());
        }

        Ok(Some(EmittedEvent {
            id: event_id.clone(),
            correlation_id: correlation_id.to_owned(),
            source: EventSource::AiAgent,
            kind: document_kind(&data),
            data,
            metadata: if metadata.is_empty() {
                None
            } else {
                Some(metadata)
            },
            created_at: Utc::now(),
        }))
    }
}

/// Derive the event type from the folded document. Producers are expected to
/// patch in a `"type"` field; a `tool_calls` key is accepted as a fallback.
fn document_kind(data: &Value) -> EventType {
    match data.get("type").and_then(Value::as_str) {
        Some(tag) => tag.parse().unwrap_or(EventType::Custom),
        None if data.get("tool_calls").is_some() => EventType::Tool,
        None => EventType::Message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(correlation_id: &str, event_id: &str, seq: u64, patches: Value) -> ChunkEvent {
        ChunkEvent {
            correlation_id: correlation_id.into(),
            event_id: EventId::from(event_id),
            seq,
            patches: serde_json::from_value(patches).unwrap(),
            metadata: Map::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn folds_message_chunks_in_order() {
        let store = MemoryEventStore::new();
        let event_id = EventId::from("e936e0ba1b");

        store
            .add_chunk(chunk(
                "c1",
                "e936e0ba1b",
                0,
                json!([
                    {"op": "add", "path": "/type", "value": "message"},
                    {"op": "add", "path": "/parts", "value": []}
                ]),
            ))
            .unwrap();
        store
            .add_chunk(chunk(
                "c1",
                "e936e0ba1b",
                1,
                json!([{"op": "add", "path": "/parts/-", "value": {"type": "content", "content": "Hi"}}]),
            ))
            .unwrap();
        store
            .add_chunk(chunk(
                "c1",
                "e936e0ba1b",
                2,
                json!([{"op": "add", "path": "/parts/-", "value": {"type": "content", "content": " there"}}]),
            ))
            .unwrap();

        let event = store.finalize_event("c1", &event_id).unwrap().unwrap();
        assert_eq!(event.kind, EventType::Message);
        assert_eq!(event.data["parts"][0]["content"], "Hi");
        assert_eq!(event.data["parts"][1]["content"], " there");
        assert_eq!(event.id, event_id);
        assert_eq!(event.source, EventSource::AiAgent);

        // The bucket is purged.
        assert!(store.finalize_event("c1", &event_id).unwrap().is_none());
    }

    #[test]
    fn rejects_out_of_order_seq() {
        let store = MemoryEventStore::new();
        store
            .add_chunk(chunk("c1", "ev00000001", 0, json!([])))
            .unwrap();

        let err = store
            .add_chunk(chunk("c1", "ev00000001", 2, json!([])))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SequenceViolation {
                expected: 1,
                got: 2,
                ..
            }
        ));

        // A replayed seq is rejected too.
        let err = store
            .add_chunk(chunk("c1", "ev00000001", 0, json!([])))
            .unwrap_err();
        assert!(matches!(err, Error::SequenceViolation { .. }));
    }

    #[test]
    fn first_chunk_must_start_at_zero() {
        let store = MemoryEventStore::new();
        let err = store
            .add_chunk(chunk("c1", "ev00000001", 5, json!([])))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SequenceViolation {
                expected: 0,
                got: 5,
                ..
            }
        ));
    }

    #[test]
    fn finalize_unknown_event_is_none() {
        let store = MemoryEventStore::new();
        assert!(store
            .finalize_event("c1", &EventId::from("missing001"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn tool_kind_inferred_from_document() {
        let store = MemoryEventStore::new();
        store
            .add_chunk(chunk(
                "c1",
                "ev00000001",
                0,
                json!([
                    {"op": "add", "path": "/tool_calls", "value": []},
                    {"op": "add", "path": "/tool_calls/-", "value": {"tool_name": "search", "arguments": {}}}
                ]),
            ))
            .unwrap();

        let event = store
            .finalize_event("c1", &EventId::from("ev00000001"))
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, EventType::Tool);
        assert_eq!(event.data["tool_calls"][0]["tool_name"], "search");
    }

    #[test]
    fn same_event_id_under_different_correlations_is_distinct() {
        let store = MemoryEventStore::new();
        store
            .add_chunk(chunk("c1", "ev00000001", 0, json!([{"op": "add", "path": "/type", "value": "message"}])))
            .unwrap();
        store
            .add_chunk(chunk("c2", "ev00000001", 0, json!([{"op": "add", "path": "/type", "value": "message"}])))
            .unwrap();

        assert_eq!(store.next_seq("c1", &EventId::from("ev00000001")), 1);
        assert!(store
            .finalize_event("c1", &EventId::from("ev00000001"))
            .unwrap()
            .is_some());
        // c2's bucket survives c1's finalization.
        assert_eq!(store.next_seq("c2", &EventId::from("ev00000001")), 1);
    }

    #[test]
    fn incompatible_patch_fails_finalization() {
        let store = MemoryEventStore::new();
        // Replace on a path that was never added.
        store
            .add_chunk(chunk(
                "c1",
                "ev00000001",
                0,
                json!([{"op": "replace", "path": "/parts/0", "value": "x"}]),
            ))
            .unwrap();

        assert!(store
            .finalize_event("c1", &EventId::from("ev00000001"))
            .is_err());
    }

    #[test]
    fn chunk_metadata_is_merged_into_final() {
        let store = MemoryEventStore::new();
        let mut chunk0 = chunk("c1", "ev00000001", 0, json!([{"op": "add", "path": "/type", "value": "message"}]));
        chunk0.metadata.insert("model".into(), json!("demo"));
        store.add_chunk(chunk0).unwrap();

        let event = store
            .finalize_event("c1", &EventId::from("ev00000001"))
            .unwrap()
            .unwrap();
        assert_eq!(event.metadata.unwrap()["model"], "demo");
    }
}
