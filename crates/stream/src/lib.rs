//! Streaming layer: chunked event accumulation and the per-correlation
//! publish/subscribe emitter that runners produce into.

pub mod emitter;
pub mod store;
pub mod types;

pub use emitter::{
    ChunkCallback, EventEmitter, FinalCallback, MemoryEventEmitter, SubscriptionId,
};
pub use store::MemoryEventStore;
pub use types::{ChunkEvent, EmittedEvent};
