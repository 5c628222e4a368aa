//! In-memory document stores (the `nanodb-memory` flavor).
//!
//! Two logical collections back the session runtime: `sessions` and
//! `session_events`; agents and users each get their own collection. Stored
//! records carry a schema version tag so a durable backend can evolve them.

mod agents;
mod sessions;
mod users;

pub use agents::MemoryAgentStore;
pub use sessions::MemorySessionStore;
pub use users::MemoryUserStore;

/// Schema version stamped on every stored record.
pub(crate) const STORE_VERSION: &str = "0.0.1";
