//! The runner-facing event emitter.
//!
//! Producers enqueue status events (emitted immediately as finals) and chunk
//! events (accumulated in the chunk store, finalized on demand). Consumers
//! subscribe per correlation id: "processed" subscribers see every chunk,
//! "final" subscribers see every finalized event.
//!
//! Each subscriber owns a bounded queue and a worker task that invokes the
//! callback, so user code never runs under the subscription lock and a slow
//! subscriber delays — but never reorders — deliveries to itself only. A
//! terminal status (`completed`/`cancelled`) closes its correlation: the
//! terminal event is still delivered, then the correlation's subscribers are
//! torn down and further enqueues are rejected.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::BoxFuture;
use json_patch::Patch;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use mur_domain::error::{Error, Result};
use mur_domain::ids::EventId;
use mur_domain::session::{EventData, EventSource, EventType, StatusEventData};

use crate::store::MemoryEventStore;
use crate::types::{ChunkEvent, EmittedEvent};

/// Handle identifying one subscription; required to unsubscribe.
pub type SubscriptionId = u64;

pub type ChunkCallback =
    Arc<dyn Fn(ChunkEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
pub type FinalCallback =
    Arc<dyn Fn(EmittedEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Queue depth per subscriber. A full queue backpressures the producer.
const SUBSCRIBER_QUEUE: usize = 64;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait EventEmitter: Send + Sync {
    /// Emit a status event immediately as a final, without chunk
    /// accumulation.
    async fn enqueue_status_event(
        &self,
        correlation_id: &str,
        data: StatusEventData,
        source: EventSource,
        metadata: Option<Map<String, Value>>,
    ) -> Result<EmittedEvent>;

    /// Append a chunk. A missing `event_id` allocates one (implicitly
    /// starting a new in-flight event); the next `seq` is assigned here.
    async fn enqueue_chunk_event(
        &self,
        correlation_id: &str,
        event_id: Option<EventId>,
        patches: Patch,
        metadata: Option<Map<String, Value>>,
    ) -> Result<EventId>;

    /// Fold the chunk sequence for an event and fan the result to final
    /// subscribers. `None` when no chunks exist.
    async fn finalize(
        &self,
        correlation_id: &str,
        event_id: &EventId,
    ) -> Result<Option<EmittedEvent>>;

    fn subscribe_processed(
        &self,
        correlation_id: &str,
        callback: ChunkCallback,
    ) -> Result<SubscriptionId>;

    fn unsubscribe_processed(&self, correlation_id: &str, subscription: SubscriptionId) -> bool;

    fn subscribe_final(
        &self,
        correlation_id: &str,
        callback: FinalCallback,
    ) -> Result<SubscriptionId>;

    fn unsubscribe_final(&self, correlation_id: &str, subscription: SubscriptionId) -> bool;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Subscribers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Subscriber<T> {
    id: SubscriptionId,
    tx: mpsc::Sender<T>,
    worker: JoinHandle<()>,
}

/// One worker per subscriber: drains the queue and invokes the callback.
/// A failing callback drops the subscriber (the worker exits, the closed
/// queue is detected on the next dispatch).
fn spawn_worker<T: Send + 'static>(
    mut rx: mpsc::Receiver<T>,
    callback: Arc<dyn Fn(T) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            if let Err(error) = (callback)(item).await {
                tracing::warn!(%error, "subscriber callback failed, dropping subscriber");
                break;
            }
        }
    })
}

fn remove_subscriber<T>(
    map: &mut HashMap<String, Vec<Subscriber<T>>>,
    correlation_id: &str,
    subscription: SubscriptionId,
) -> Option<Subscriber<T>> {
    let subs = map.get_mut(correlation_id)?;
    let idx = subs.iter().position(|s| s.id == subscription)?;
    let sub = subs.remove(idx);
    if subs.is_empty() {
        map.remove(correlation_id);
    }
    Some(sub)
}

/// Send `item` to every target sequentially; returns the ids whose queues
/// were gone (worker exited).
async fn fan_out<T: Clone>(
    targets: Vec<(SubscriptionId, mpsc::Sender<T>)>,
    item: T,
) -> Vec<SubscriptionId> {
    let mut dead = Vec::new();
    for (id, tx) in targets {
        if tx.send(item.clone()).await.is_err() {
            dead.push(id);
        }
    }
    dead
}

#[derive(Default)]
struct SubscriberTables {
    processed: HashMap<String, Vec<Subscriber<ChunkEvent>>>,
    finals: HashMap<String, Vec<Subscriber<EmittedEvent>>>,
    closed: HashSet<String>,
    next_id: SubscriptionId,
    stopped: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory emitter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct MemoryEventEmitter {
    store: Arc<MemoryEventStore>,
    subs: Mutex<SubscriberTables>,
}

impl MemoryEventEmitter {
    pub fn new(store: Arc<MemoryEventStore>) -> Self {
        Self {
            store,
            subs: Mutex::new(SubscriberTables::default()),
        }
    }

    /// Live subscriptions (processed + final) for a correlation.
    pub fn subscription_count(&self, correlation_id: &str) -> usize {
        let tables = self.subs.lock();
        tables.processed.get(correlation_id).map_or(0, Vec::len)
            + tables.finals.get(correlation_id).map_or(0, Vec::len)
    }

    /// Tear down every subscription and reject new ones. Workers are awaited
    /// so already-queued deliveries drain first.
    pub async fn stop(&self) {
        let mut workers = Vec::new();
        {
            let mut tables = self.subs.lock();
            tables.stopped = true;
            for (_, subs) in tables.processed.drain() {
                workers.extend(subs.into_iter().map(|s| s.worker));
            }
            for (_, subs) in tables.finals.drain() {
                workers.extend(subs.into_iter().map(|s| s.worker));
            }
        }
        for worker in workers {
            let _ = worker.await;
        }
    }

    fn ensure_open(&self, correlation_id: &str) -> Result<()> {
        let tables = self.subs.lock();
        if tables.stopped {
            return Err(Error::EmitterStopped);
        }
        if tables.closed.contains(correlation_id) {
            return Err(Error::CorrelationClosed(correlation_id.to_owned()));
        }
        Ok(())
    }

    /// Close a correlation after its terminal event was queued. Dropping the
    /// senders lets each worker drain (terminal included) and exit.
    fn close_correlation(&self, correlation_id: &str) {
        let mut tables = self.subs.lock();
        tables.closed.insert(correlation_id.to_owned());
        tables.processed.remove(correlation_id);
        tables.finals.remove(correlation_id);
    }

    async fn dispatch_chunk(&self, correlation_id: &str, chunk: ChunkEvent) {
        let targets: Vec<_> = {
            let tables = self.subs.lock();
            tables
                .processed
                .get(correlation_id)
                .map(|subs| subs.iter().map(|s| (s.id, s.tx.clone())).collect())
                .unwrap_or_default()
        };
        let dead = fan_out(targets, chunk).await;
        if !dead.is_empty() {
            let mut tables = self.subs.lock();
            if let Some(subs) = tables.processed.get_mut(correlation_id) {
                subs.retain(|s| !dead.contains(&s.id));
            }
        }
    }

    async fn dispatch_final(&self, correlation_id: &str, event: EmittedEvent) {
        let targets: Vec<_> = {
            let tables = self.subs.lock();
            tables
                .finals
                .get(correlation_id)
                .map(|subs| subs.iter().map(|s| (s.id, s.tx.clone())).collect())
                .unwrap_or_default()
        };
        let dead = fan_out(targets, event).await;
        if !dead.is_empty() {
            let mut tables = self.subs.lock();
            if let Some(subs) = tables.finals.get_mut(correlation_id) {
                subs.retain(|s| !dead.contains(&s.id));
            }
        }
    }
}

#[async_trait]
impl EventEmitter for MemoryEventEmitter {
    async fn enqueue_status_event(
        &self,
        correlation_id: &str,
        data: StatusEventData,
        source: EventSource,
        metadata: Option<Map<String, Value>>,
    ) -> Result<EmittedEvent> {
        self.ensure_open(correlation_id)?;
        let terminal = data.status.is_terminal();

        let event = EmittedEvent {
            id: EventId::generate(),
            correlation_id: correlation_id.to_owned(),
            source,
            kind: EventType::Status,
            data: EventData::Status(data).into_value(),
            metadata,
            created_at: Utc::now(),
        };

        self.dispatch_final(correlation_id, event.clone()).await;
        if terminal {
            tracing::debug!(correlation_id, "correlation closed by terminal status");
            self.close_correlation(correlation_id);
        }
        Ok(event)
    }

    async fn enqueue_chunk_event(
        &self,
        correlation_id: &str,
        event_id: Option<EventId>,
        patches: Patch,
        metadata: Option<Map<String, Value>>,
    ) -> Result<EventId> {
        self.ensure_open(correlation_id)?;
        let event_id = event_id.unwrap_or_else(EventId::generate);

        let chunk = ChunkEvent {
            correlation_id: correlation_id.to_owned(),
            event_id: event_id.clone(),
            seq: self.store.next_seq(correlation_id, &event_id),
            patches,
            metadata: metadata.unwrap_or_default(),
            timestamp: Utc::now(),
        };

        match self.store.add_chunk(chunk.clone()) {
            Ok(()) => self.dispatch_chunk(correlation_id, chunk).await,
            Err(error @ Error::SequenceViolation { .. }) => {
                // The offending chunk is dropped; the producer keeps going.
                tracing::warn!(%error, correlation_id, "chunk dropped");
            }
            Err(error) => return Err(error),
        }
        Ok(event_id)
    }

    async fn finalize(
        &self,
        correlation_id: &str,
        event_id: &EventId,
    ) -> Result<Option<EmittedEvent>> {
        self.ensure_open(correlation_id)?;
        let Some(event) = self.store.finalize_event(correlation_id, event_id)? else {
            return Ok(None);
        };
        self.dispatch_final(correlation_id, event.clone()).await;
        Ok(Some(event))
    }

    fn subscribe_processed(
        &self,
        correlation_id: &str,
        callback: ChunkCallback,
    ) -> Result<SubscriptionId> {
        let mut tables = self.subs.lock();
        if tables.stopped {
            return Err(Error::EmitterStopped);
        }
        if tables.closed.contains(correlation_id) {
            return Err(Error::CorrelationClosed(correlation_id.to_owned()));
        }
        let id = tables.next_id;
        tables.next_id += 1;
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
        let worker = spawn_worker(rx, callback);
        tables
            .processed
            .entry(correlation_id.to_owned())
            .or_default()
            .push(Subscriber { id, tx, worker });
        Ok(id)
    }

    fn unsubscribe_processed(&self, correlation_id: &str, subscription: SubscriptionId) -> bool {
        let removed = {
            let mut tables = self.subs.lock();
            remove_subscriber(&mut tables.processed, correlation_id, subscription)
        };
        match removed {
            Some(sub) => {
                sub.worker.abort();
                true
            }
            None => false,
        }
    }

    fn subscribe_final(
        &self,
        correlation_id: &str,
        callback: FinalCallback,
    ) -> Result<SubscriptionId> {
        let mut tables = self.subs.lock();
        if tables.stopped {
            return Err(Error::EmitterStopped);
        }
        if tables.closed.contains(correlation_id) {
            return Err(Error::CorrelationClosed(correlation_id.to_owned()));
        }
        let id = tables.next_id;
        tables.next_id += 1;
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
        let worker = spawn_worker(rx, callback);
        tables
            .finals
            .entry(correlation_id.to_owned())
            .or_default()
            .push(Subscriber { id, tx, worker });
        Ok(id)
    }

    fn unsubscribe_final(&self, correlation_id: &str, subscription: SubscriptionId) -> bool {
        let removed = {
            let mut tables = self.subs.lock();
            remove_subscriber(&mut tables.finals, correlation_id, subscription)
        };
        match removed {
            Some(sub) => {
                sub.worker.abort();
                true
            }
            None => false,
        }
    }
}
