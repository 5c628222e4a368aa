use crate::ids::{AgentId, EventId, SessionId};

/// Shared error type used across all Murmur crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("unknown agent type: {0}")]
    UnknownAgentType(String),

    #[error("task already running under tag {0}")]
    AlreadyRunning(String),

    #[error("out-of-order chunk for event {event_id}: expected seq {expected}, got {got}")]
    SequenceViolation {
        event_id: EventId,
        expected: u64,
        got: u64,
    },

    #[error("correlation {0} is closed")]
    CorrelationClosed(String),

    #[error("emitter is stopped")]
    EmitterStopped,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
