//! Session endpoints.
//!
//! - `POST /api/sessions`                      — create a session (optionally greeted)
//! - `GET  /api/sessions/{id}`                 — fetch one session
//! - `POST /api/sessions/{id}/events/stream`   — post a user message, stream the turn (SSE)
//! - `GET  /api/sessions/{id}/events`          — list persisted events with filters

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::Json;
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use mur_domain::ids::{gen_id, AgentId, SessionId, UserId};
use mur_domain::session::{
    ContentPart, Event, EventData, EventSource, EventType, MessageEventData, Participant,
    Session, CLIENT_CONSUMER,
};
use mur_runtime::correlator::ContextualCorrelator;
use mur_stream::emitter::EventEmitter;

use crate::api::error::{ApiError, ValidJson};
use crate::runtime::sse::stream_frames;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / response shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct SessionCreationParams {
    pub agent_id: AgentId,
    #[serde(default)]
    pub id: Option<SessionId>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AllowGreetingQuery {
    #[serde(default)]
    pub allow_greeting: bool,
}

#[derive(Debug, Serialize)]
pub struct ConsumptionOffsetsDTO {
    pub client: u64,
}

#[derive(Debug, Serialize)]
pub struct SessionDTO {
    pub id: SessionId,
    pub agent_id: AgentId,
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub consumption_offsets: ConsumptionOffsetsDTO,
    pub created_at: DateTime<Utc>,
}

impl From<Session> for SessionDTO {
    fn from(session: Session) -> Self {
        let client = session
            .consumption_offsets
            .get(CLIENT_CONSUMER)
            .copied()
            .unwrap_or(0);
        Self {
            id: session.id,
            agent_id: session.agent_id,
            user_id: session.user_id,
            title: session.title,
            consumption_offsets: ConsumptionOffsetsDTO { client },
            created_at: session.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EventCreationParams {
    #[serde(rename = "type")]
    pub kind: EventType,
    pub source: EventSource,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct EventListQuery {
    #[serde(default)]
    pub min_offset: Option<u64>,
    #[serde(default)]
    pub source: Option<EventSource>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    /// Comma-separated event types, e.g. `message,tool`.
    #[serde(default)]
    pub types: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventsDTO {
    pub data: Vec<Event>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn create_session(
    State(state): State<AppState>,
    Query(query): Query<AllowGreetingQuery>,
    ValidJson(params): ValidJson<SessionCreationParams>,
) -> Result<(StatusCode, Json<SessionDTO>), ApiError> {
    let user = state.auth.authenticate().await?;

    let agent = state
        .agents
        .read_agent(&params.agent_id)
        .await?
        .ok_or_else(|| {
            ApiError::invalid_request(format!("Agent with ID {} not found", params.agent_id))
        })?;

    let session = state
        .session_service
        .create_user_session(user.id, &agent, params.id, params.title, query.allow_greeting)
        .await?;

    Ok((StatusCode::CREATED, Json(session.into())))
}

pub async fn read_session(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<SessionDTO>, ApiError> {
    state
        .sessions
        .read_session(&session_id)
        .await?
        .map(|session| Json(session.into()))
        .ok_or_else(|| ApiError::not_found(format!("Session with ID {session_id} not found")))
}

/// Post a user message and stream the resulting turn over SSE.
pub async fn create_event_and_stream(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    ValidJson(params): ValidJson<EventCreationParams>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    if params.kind != EventType::Message {
        return Err(ApiError::validation(
            "Only message events can currently be added manually",
        ));
    }
    if params.source != EventSource::User {
        return Err(ApiError::validation(
            "Only \"user\" source is supported for direct posting",
        ));
    }
    if params.content.is_empty() {
        return Err(ApiError::validation(
            "Missing 'content' field in event parameters",
        ));
    }

    let session = state
        .sessions
        .read_session(&session_id)
        .await?
        .ok_or_else(|| {
            ApiError::invalid_request(format!("Session with ID {session_id} not found"))
        })?;
    let agent = state
        .agents
        .read_agent(&session.agent_id)
        .await?
        .ok_or_else(|| {
            ApiError::invalid_request(format!("Agent with ID {} not found", session.agent_id))
        })?;

    let display_name = match state.users.read_user(&session.user_id).await? {
        Some(user) => user.name,
        None => session.user_id.to_string(),
    };

    let data = EventData::Message(MessageEventData {
        participant: Participant {
            id: session.user_id.to_string(),
            name: display_name,
        },
        parts: vec![ContentPart::Content {
            content: params.content,
        }],
        flagged: Some(false),
        tags: None,
    })
    .into_value();

    // Compose the turn's correlation up front and attach the bridge before
    // dispatching, so the stream observes the turn from its first event.
    let correlation_id = ContextualCorrelator::compose(&gen_id());
    let emitter: Arc<dyn EventEmitter> = state.emitter.clone();
    let frames = stream_frames(
        session_id,
        correlation_id.clone(),
        state.sessions.clone(),
        state.session_service.clone(),
        emitter,
    );

    state
        .session_service
        .post_event_scoped(
            &session,
            &agent,
            EventType::Message,
            data,
            EventSource::User,
            correlation_id,
        )
        .await?;
    let stream = frames.map(|frame| {
        Ok(SseEvent::default().event(frame.event).data(frame.data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn list_events(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Query(query): Query<EventListQuery>,
) -> Result<Json<EventsDTO>, ApiError> {
    if state.sessions.read_session(&session_id).await?.is_none() {
        return Err(ApiError::invalid_request(format!(
            "Cannot list events for non-existent session with ID {session_id}"
        )));
    }

    let types: Vec<EventType> = match &query.types {
        Some(raw) => raw
            .split(',')
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(ApiError::validation)?,
        None => Vec::new(),
    };

    let data = state
        .sessions
        .list_events(
            &session_id,
            query.source,
            query.correlation_id.as_deref(),
            &types,
            query.min_offset,
            true,
        )
        .await?;

    Ok(Json(EventsDTO { data }))
}
