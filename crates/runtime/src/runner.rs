//! The agent-runner contract.
//!
//! A runner is an opaque producer: given a context it emits events through
//! the [`EventEmitter`] until the turn is done. The factory maps an agent's
//! `type` tag to a runner instance.

use std::sync::Arc;

use async_trait::async_trait;

use mur_domain::error::Result;
use mur_domain::ids::{AgentId, SessionId};
use mur_stream::emitter::EventEmitter;

/// Everything a runner learns about the turn it is producing for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub session_id: SessionId,
    pub agent_id: AgentId,
}

#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Produce the events of one turn. Returns whether the turn ran to a
    /// useful conclusion.
    async fn run(&self, context: Context, emitter: Arc<dyn EventEmitter>)
        -> anyhow::Result<bool>;
}

/// Resolves a runner from an agent's `type` tag. Unknown tags fail with
/// [`mur_domain::Error::UnknownAgentType`].
pub trait AgentRunnerFactory: Send + Sync {
    fn create_runner(&self, agent_type: &str) -> Result<Arc<dyn AgentRunner>>;
}
