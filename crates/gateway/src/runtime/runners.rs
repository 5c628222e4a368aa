//! Runner registry and the built-in echo runner.

use std::collections::HashMap;
use std::sync::Arc;

use json_patch::Patch;
use serde_json::json;

use mur_domain::error::{Error, Result};
use mur_domain::session::{
    EventSource, EventType, SessionStatus, SessionStore, StatusEventData,
};
use mur_runtime::correlator::ContextualCorrelator;
use mur_runtime::runner::{AgentRunner, AgentRunnerFactory, Context};
use mur_stream::emitter::EventEmitter;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Maps agent `type` tags to runner instances.
#[derive(Default)]
pub struct RunnerRegistry {
    runners: HashMap<String, Arc<dyn AgentRunner>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent_type: impl Into<String>, runner: Arc<dyn AgentRunner>) {
        self.runners.insert(agent_type.into(), runner);
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }
}

impl AgentRunnerFactory for RunnerRegistry {
    fn create_runner(&self, agent_type: &str) -> Result<Arc<dyn AgentRunner>> {
        self.runners
            .get(agent_type)
            .cloned()
            .ok_or_else(|| Error::UnknownAgentType(agent_type.to_owned()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Echo runner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The built-in `echo` agent: streams the latest user message back word by
/// word, then completes. Exists so a fresh server has a working end-to-end
/// turn without any external runner.
pub struct EchoRunner {
    sessions: Arc<dyn SessionStore>,
}

impl EchoRunner {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }
}

#[async_trait::async_trait]
impl AgentRunner for EchoRunner {
    async fn run(
        &self,
        context: Context,
        emitter: Arc<dyn EventEmitter>,
    ) -> anyhow::Result<bool> {
        let correlation_id = ContextualCorrelator::current();

        emitter
            .enqueue_status_event(
                &correlation_id,
                StatusEventData::new(SessionStatus::Typing),
                EventSource::AiAgent,
                None,
            )
            .await?;

        // Latest user message is what we echo.
        let user_events = self
            .sessions
            .list_events(
                &context.session_id,
                Some(EventSource::User),
                None,
                &[EventType::Message],
                None,
                true,
            )
            .await?;
        let last = user_events.last();
        let acknowledged_offset = last.map(|e| e.offset);
        let text = last
            .and_then(|e| e.data["parts"][0]["content"].as_str())
            .unwrap_or("Hello!")
            .to_owned();

        emitter
            .enqueue_status_event(
                &correlation_id,
                StatusEventData::new(SessionStatus::Processing),
                EventSource::AiAgent,
                None,
            )
            .await?;

        // Open a message event and stream the text as content parts.
        let opening: Patch = serde_json::from_value(json!([
            {"op": "add", "path": "/type", "value": "message"},
            {"op": "add", "path": "/participant", "value": {
                "id": context.agent_id.as_str(),
                "name": "echo",
            }},
            {"op": "add", "path": "/parts", "value": []},
        ]))?;
        let event_id = emitter
            .enqueue_chunk_event(&correlation_id, None, opening, None)
            .await?;

        for word in text.split_inclusive(' ') {
            let patch: Patch = serde_json::from_value(json!([
                {"op": "add", "path": "/parts/-", "value": {"type": "content", "content": word}},
            ]))?;
            emitter
                .enqueue_chunk_event(&correlation_id, Some(event_id.clone()), patch, None)
                .await?;
        }

        emitter.finalize(&correlation_id, &event_id).await?;

        emitter
            .enqueue_status_event(
                &correlation_id,
                StatusEventData {
                    status: SessionStatus::Completed,
                    acknowledged_offset,
                    data: None,
                },
                EventSource::AiAgent,
                None,
            )
            .await?;

        Ok(true)
    }
}
