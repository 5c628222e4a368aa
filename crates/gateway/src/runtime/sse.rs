//! The SSE bridge: couples one live HTTP response stream to a
//! correlation-scoped emitter subscription.
//!
//! The bridge subscribes a chunk callback and a final callback, both feeding
//! one bounded channel, and turns deliveries into SSE frames. Finalized
//! events are persisted to the session log *before* their frame is written,
//! so anything a reconnecting client can list was also observed in-stream or
//! lost to the disconnect alone. Chunks are framed without persisting.
//!
//! A terminal status (`completed`/`cancelled`) is persisted, framed, and
//! closes the stream. Dropping the stream before that point counts as a
//! client disconnect: the session's processing task is cancelled. Both
//! subscriptions are removed exactly once on every exit path — the drop
//! guard owns them.

use std::sync::Arc;

use futures_util::Stream;
use serde_json::Value;
use tokio::sync::mpsc;

use mur_domain::ids::SessionId;
use mur_domain::session::{EventType, SessionStore};
use mur_stream::emitter::{EventEmitter, SubscriptionId};
use mur_stream::types::{ChunkEvent, EmittedEvent};

use crate::runtime::service::SessionService;

/// Channel depth between the emitter callbacks and the frame loop.
const STREAM_QUEUE: usize = 64;

/// One SSE record: `event: <event>\ndata: <data>\n\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: String,
    pub data: String,
}

impl Frame {
    fn error(message: &str) -> Self {
        Self {
            event: "error".to_owned(),
            data: serde_json::json!({ "message": message }).to_string(),
        }
    }
}

enum StreamItem {
    Chunk(ChunkEvent),
    Final(EmittedEvent),
}

/// Stream the events of one turn as SSE frames.
pub fn stream_frames(
    session_id: SessionId,
    correlation_id: String,
    sessions: Arc<dyn SessionStore>,
    service: Arc<SessionService>,
    emitter: Arc<dyn EventEmitter>,
) -> impl Stream<Item = Frame> + Send {
    // Subscribe before returning — callers rely on the bridge being attached
    // the moment this function returns, not on the client's first poll, so a
    // turn dispatched right after cannot outrun its audience.
    let (tx, mut rx) = mpsc::channel::<StreamItem>(STREAM_QUEUE);

    let chunk_tx = tx.clone();
    let chunk_sub = emitter.subscribe_processed(
        &correlation_id,
        Arc::new(move |chunk| {
            let tx = chunk_tx.clone();
            Box::pin(async move {
                tx.send(StreamItem::Chunk(chunk))
                    .await
                    .map_err(|_| anyhow::anyhow!("stream receiver dropped"))
            })
        }),
    );
    let final_tx = tx.clone();
    let final_sub = chunk_sub.as_ref().ok().map(|_| {
        emitter.subscribe_final(
            &correlation_id,
            Arc::new(move |event| {
                let tx = final_tx.clone();
                Box::pin(async move {
                    tx.send(StreamItem::Final(event))
                        .await
                        .map_err(|_| anyhow::anyhow!("stream receiver dropped"))
                })
            }),
        )
    });
    drop(tx);

    let guard = match (chunk_sub, final_sub) {
        (Ok(chunk_sub), Some(Ok(final_sub))) => Some(StreamGuard {
            session_id,
            correlation_id: correlation_id.clone(),
            service,
            emitter,
            chunk_sub,
            final_sub,
            completed: false,
        }),
        (Ok(chunk_sub), Some(Err(error))) => {
            // Turn already over (or emitter stopping): nothing to stream.
            tracing::debug!(%error, correlation_id, "stream subscription rejected");
            emitter.unsubscribe_processed(&correlation_id, chunk_sub);
            None
        }
        (Err(error), _) => {
            tracing::debug!(%error, correlation_id, "stream subscription rejected");
            None
        }
        (Ok(_), None) => unreachable!("final_sub is always Some when chunk_sub is Ok"),
    };

    async_stream::stream! {
        let Some(mut guard) = guard else { return };

        while let Some(item) = rx.recv().await {
            match item {
                StreamItem::Final(event) => {
                    // Persist first; a log the client can replay must never
                    // be ahead of what it saw live.
                    let persisted = sessions
                        .create_event(
                            &guard.session_id,
                            event.source,
                            event.kind,
                            &event.correlation_id,
                            event.data.clone(),
                            event.metadata.clone(),
                            None,
                        )
                        .await;
                    if let Err(error) = persisted {
                        tracing::error!(%error, "persisting streamed event failed");
                        // Fatal to the stream only — the producer runs on.
                        guard.completed = true;
                        yield Frame::error(&error.to_string());
                        break;
                    }

                    if event.kind == EventType::Status && is_terminal_status(&event.data) {
                        yield final_frame(&event);
                        guard.completed = true;
                        break;
                    }

                    // A message with nothing to show is persisted above but
                    // suppressed on the wire.
                    if event.kind == EventType::Message && message_parts_empty(&event.data) {
                        continue;
                    }
                    yield final_frame(&event);
                }
                StreamItem::Chunk(chunk) => {
                    yield chunk_frame(&chunk);
                }
            }
        }
        // guard drops here: unsubscribes both callbacks, and treats an
        // abandoned stream as a client disconnect.
    }
}

struct StreamGuard {
    session_id: SessionId,
    correlation_id: String,
    service: Arc<SessionService>,
    emitter: Arc<dyn EventEmitter>,
    chunk_sub: SubscriptionId,
    final_sub: SubscriptionId,
    completed: bool,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.emitter
            .unsubscribe_processed(&self.correlation_id, self.chunk_sub);
        self.emitter
            .unsubscribe_final(&self.correlation_id, self.final_sub);

        if !self.completed {
            // Client went away mid-turn.
            let service = self.service.clone();
            let session_id = self.session_id.clone();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    service.cancel_processing_session_task(&session_id).await;
                });
            }
        }
    }
}

fn final_frame(event: &EmittedEvent) -> Frame {
    Frame {
        event: event.kind.as_str().to_owned(),
        data: serde_json::to_string(event).unwrap_or_default(),
    }
}

/// Chunks carry no type tag; derive the frame kind from what the patches
/// build.
fn chunk_frame(chunk: &ChunkEvent) -> Frame {
    let patches = serde_json::to_value(&chunk.patches).unwrap_or_default();
    let targets_tools = patches.as_array().is_some_and(|ops| {
        ops.iter().any(|op| {
            op.get("path")
                .and_then(Value::as_str)
                .is_some_and(|path| path == "/tool_calls" || path.starts_with("/tool_calls/"))
        })
    });
    Frame {
        event: if targets_tools { "tool" } else { "message" }.to_owned(),
        data: serde_json::to_string(chunk).unwrap_or_default(),
    }
}

fn is_terminal_status(data: &Value) -> bool {
    matches!(
        data.get("status").and_then(Value::as_str),
        Some("completed" | "cancelled")
    )
}

fn message_parts_empty(data: &Value) -> bool {
    data.get("parts")
        .and_then(Value::as_array)
        .is_none_or(|parts| parts.is_empty())
}
