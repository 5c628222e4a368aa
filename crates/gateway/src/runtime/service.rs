//! Session orchestration: session creation, user-event ingestion, and the
//! dispatch/cancel lifecycle of per-session processing tasks.
//!
//! At most one processing task exists per session; its registry tag is
//! `process-session({session_id})`. Dispatching while a turn is producing
//! cancels and supersedes it.

use std::sync::Arc;

use serde_json::Value;
use tracing::Instrument;

use mur_domain::agent::Agent;
use mur_domain::error::Result;
use mur_domain::ids::{gen_id, SessionId, UserId};
use mur_domain::session::{Event, EventSource, EventType, Session, SessionStore};
use mur_runtime::correlator::ContextualCorrelator;
use mur_runtime::runner::{AgentRunnerFactory, Context};
use mur_runtime::tasks::BackgroundTaskService;
use mur_stream::emitter::EventEmitter;

pub struct SessionService {
    sessions: Arc<dyn SessionStore>,
    tasks: Arc<BackgroundTaskService>,
    runners: Arc<dyn AgentRunnerFactory>,
    emitter: Arc<dyn EventEmitter>,
}

impl SessionService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        tasks: Arc<BackgroundTaskService>,
        runners: Arc<dyn AgentRunnerFactory>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            sessions,
            tasks,
            runners,
            emitter,
        }
    }

    /// Registry tag of a session's processing task.
    pub fn process_tag(session_id: &SessionId) -> String {
        format!("process-session({session_id})")
    }

    /// Create a session between a user and an agent. With `allow_greeting`
    /// the agent gets to speak first: a processing task is dispatched
    /// immediately.
    pub async fn create_user_session(
        &self,
        user_id: UserId,
        agent: &Agent,
        id: Option<SessionId>,
        title: Option<String>,
        allow_greeting: bool,
    ) -> Result<Session> {
        let session = self
            .sessions
            .create_session(user_id, agent.id.clone(), id, None, title, None)
            .await?;

        if allow_greeting {
            self.dispatch_processing_task(&session, agent, None).await?;
        }

        Ok(session)
    }

    /// Restart the session's processing task. Returns the correlation id the
    /// turn runs under (freshly scoped unless one was supplied).
    pub async fn dispatch_processing_task(
        &self,
        session: &Session,
        agent: &Agent,
        correlation_id: Option<String>,
    ) -> Result<String> {
        let correlation_id =
            correlation_id.unwrap_or_else(|| ContextualCorrelator::compose(&gen_id()));

        let runner = self.runners.create_runner(&agent.kind)?;
        let context = Context {
            session_id: session.id.clone(),
            agent_id: session.agent_id.clone(),
        };
        let emitter = self.emitter.clone();
        let corr = correlation_id.clone();
        let span = tracing::info_span!(
            "process_session",
            session_id = %session.id,
            agent_type = %agent.kind,
            correlation_id = %corr,
        );

        let body = async move {
            // The spawned task re-enters the turn's correlation scope so the
            // runner's emits carry it.
            let result = ContextualCorrelator::enter(corr, runner.run(context, emitter)).await;
            if let Err(error) = result {
                tracing::error!(%error, "agent runner failed");
            }
        }
        .instrument(span);

        self.tasks
            .restart(body, &Self::process_tag(&session.id))
            .await;

        Ok(correlation_id)
    }

    /// Cancel the session's processing task, if any.
    pub async fn cancel_processing_session_task(&self, session_id: &SessionId) -> bool {
        self.tasks
            .cancel(&Self::process_tag(session_id), "user-cancel")
            .await
    }

    /// Append an event to the session log. With `trigger_processing` the
    /// append and the dispatched turn share a fresh correlation scope;
    /// without it the event is recorded under the ambient correlation.
    pub async fn post_event(
        &self,
        session: &Session,
        agent: &Agent,
        kind: EventType,
        data: Value,
        source: EventSource,
        trigger_processing: bool,
    ) -> Result<Event> {
        if trigger_processing {
            let correlation_id = ContextualCorrelator::compose(&gen_id());
            self.post_event_scoped(session, agent, kind, data, source, correlation_id)
                .await
        } else {
            let correlation_id = ContextualCorrelator::current();
            self.sessions
                .create_event(&session.id, source, kind, &correlation_id, data, None, None)
                .await
        }
    }

    /// Append and dispatch under a caller-chosen correlation id. The SSE
    /// route composes the id up front so its bridge can subscribe before the
    /// turn starts producing.
    pub async fn post_event_scoped(
        &self,
        session: &Session,
        agent: &Agent,
        kind: EventType,
        data: Value,
        source: EventSource,
        correlation_id: String,
    ) -> Result<Event> {
        let event = self
            .sessions
            .create_event(&session.id, source, kind, &correlation_id, data, None, None)
            .await?;
        self.dispatch_processing_task(session, agent, Some(correlation_id))
            .await?;
        Ok(event)
    }
}
