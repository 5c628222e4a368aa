//! Session and event-log store.
//!
//! A single readers-writer lock guards both collections: reads are
//! concurrent, while event appends and session deletes are exclusive. The
//! count-offset-then-insert pair in [`create_event`] runs entirely under the
//! writer lock, which keeps per-session offsets gap-free under concurrency.
//!
//! [`create_event`]: mur_domain::session::SessionStore::create_event

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value};

use mur_domain::error::{Error, Result};
use mur_domain::ids::{AgentId, EventId, SessionId, UserId};
use mur_domain::session::{
    Event, EventSource, EventType, Session, SessionMode, SessionStore,
};

use crate::STORE_VERSION;

struct SessionRecord {
    session: Session,
    #[allow(dead_code)]
    version: &'static str,
}

struct EventRecord {
    session_id: SessionId,
    event: Event,
    #[allow(dead_code)]
    version: &'static str,
}

#[derive(Default)]
struct Collections {
    /// `sessions` collection, keyed by id.
    sessions: Vec<SessionRecord>,
    /// `session_events` collection, in insertion order.
    events: Vec<EventRecord>,
}

/// In-memory [`SessionStore`].
#[derive(Default)]
pub struct MemorySessionStore {
    inner: RwLock<Collections>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(
        &self,
        user_id: UserId,
        agent_id: AgentId,
        id: Option<SessionId>,
        mode: Option<SessionMode>,
        title: Option<String>,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<Session> {
        let session = Session {
            id: id.unwrap_or_else(SessionId::generate),
            user_id,
            agent_id,
            mode: mode.unwrap_or_default(),
            title,
            consumption_offsets: Session::initial_offsets(),
            created_at: created_at.unwrap_or_else(Utc::now),
        };

        let mut inner = self.inner.write();
        inner.sessions.push(SessionRecord {
            session: session.clone(),
            version: STORE_VERSION,
        });
        Ok(session)
    }

    async fn read_session(&self, session_id: &SessionId) -> Result<Option<Session>> {
        let inner = self.inner.read();
        Ok(inner
            .sessions
            .iter()
            .find(|r| &r.session.id == session_id)
            .map(|r| r.session.clone()))
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<bool> {
        let mut inner = self.inner.write();
        // Events first, then the session record, under one exclusive hold.
        inner.events.retain(|r| &r.session_id != session_id);
        let before = inner.sessions.len();
        inner.sessions.retain(|r| &r.session.id != session_id);
        Ok(inner.sessions.len() < before)
    }

    async fn list_sessions(
        &self,
        agent_id: Option<&AgentId>,
        user_id: Option<&UserId>,
    ) -> Result<Vec<Session>> {
        let inner = self.inner.read();
        Ok(inner
            .sessions
            .iter()
            .filter(|r| agent_id.is_none_or(|a| &r.session.agent_id == a))
            .filter(|r| user_id.is_none_or(|u| &r.session.user_id == u))
            .map(|r| r.session.clone())
            .collect())
    }

    async fn create_event(
        &self,
        session_id: &SessionId,
        source: EventSource,
        kind: EventType,
        correlation_id: &str,
        data: Value,
        metadata: Option<Map<String, Value>>,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<Event> {
        let mut inner = self.inner.write();

        if !inner.sessions.iter().any(|r| &r.session.id == session_id) {
            return Err(Error::SessionNotFound(session_id.clone()));
        }

        let offset = inner
            .events
            .iter()
            .filter(|r| &r.session_id == session_id && !r.event.deleted)
            .count() as u64;

        let event = Event {
            id: EventId::generate(),
            source,
            kind,
            offset,
            correlation_id: correlation_id.to_owned(),
            data,
            metadata,
            deleted: false,
            created_at: created_at.unwrap_or_else(Utc::now),
        };

        inner.events.push(EventRecord {
            session_id: session_id.clone(),
            event: event.clone(),
            version: STORE_VERSION,
        });
        Ok(event)
    }

    async fn read_event(
        &self,
        session_id: &SessionId,
        event_id: &EventId,
    ) -> Result<Option<Event>> {
        let inner = self.inner.read();
        Ok(inner
            .events
            .iter()
            .find(|r| &r.session_id == session_id && &r.event.id == event_id)
            .map(|r| r.event.clone()))
    }

    async fn list_events(
        &self,
        session_id: &SessionId,
        source: Option<EventSource>,
        correlation_id: Option<&str>,
        types: &[EventType],
        min_offset: Option<u64>,
        exclude_deleted: bool,
    ) -> Result<Vec<Event>> {
        let inner = self.inner.read();
        Ok(inner
            .events
            .iter()
            .filter(|r| &r.session_id == session_id)
            .filter(|r| source.is_none_or(|s| r.event.source == s))
            .filter(|r| correlation_id.is_none_or(|c| r.event.correlation_id == c))
            .filter(|r| types.is_empty() || types.contains(&r.event.kind))
            .filter(|r| min_offset.is_none_or(|m| r.event.offset >= m))
            .filter(|r| !exclude_deleted || !r.event.deleted)
            .map(|r| r.event.clone())
            .collect())
    }

    async fn delete_event(&self, event_id: &EventId) -> Result<bool> {
        let mut inner = self.inner.write();
        match inner.events.iter_mut().find(|r| &r.event.id == event_id) {
            Some(record) => {
                record.event.deleted = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    async fn session_with_store() -> (Arc<MemorySessionStore>, Session) {
        let store = Arc::new(MemorySessionStore::new());
        let session = store
            .create_session(
                UserId::from("v9pg5Zv3h4"),
                AgentId::from("fxjwGfAIYV"),
                None,
                None,
                Some("Test session".into()),
                None,
            )
            .await
            .unwrap();
        (store, session)
    }

    async fn append(
        store: &MemorySessionStore,
        session_id: &SessionId,
        source: EventSource,
        kind: EventType,
        correlation_id: &str,
    ) -> Event {
        store
            .create_event(
                session_id,
                source,
                kind,
                correlation_id,
                json!({"type": kind.as_str()}),
                None,
                None,
            )
            .await
            .unwrap()
    }

    // ── Sessions ────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_and_read_session() {
        let (store, session) = session_with_store().await;

        assert_eq!(session.id.as_str().len(), 10);
        assert_eq!(session.consumption_offsets.get("client"), Some(&0));
        assert_eq!(session.mode, SessionMode::Auto);

        let read = store.read_session(&session.id).await.unwrap().unwrap();
        assert_eq!(read, session);
    }

    #[tokio::test]
    async fn create_session_with_explicit_id() {
        let store = MemorySessionStore::new();
        let session = store
            .create_session(
                UserId::from("u"),
                AgentId::from("a"),
                Some(SessionId::from("SeSsIoN001")),
                Some(SessionMode::Manual),
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(session.id, SessionId::from("SeSsIoN001"));
        assert_eq!(session.mode, SessionMode::Manual);
    }

    #[tokio::test]
    async fn read_missing_session_is_none() {
        let store = MemorySessionStore::new();
        let found = store
            .read_session(&SessionId::from("missing001"))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn delete_session_cascades_to_events() {
        let (store, session) = session_with_store().await;
        append(&store, &session.id, EventSource::User, EventType::Message, "c1").await;
        append(&store, &session.id, EventSource::AiAgent, EventType::Status, "c1").await;

        assert!(store.delete_session(&session.id).await.unwrap());
        assert!(store.read_session(&session.id).await.unwrap().is_none());

        // Re-creating the same id starts from an empty log.
        store
            .create_session(
                session.user_id.clone(),
                session.agent_id.clone(),
                Some(session.id.clone()),
                None,
                None,
                None,
            )
            .await
            .unwrap();
        let events = store
            .list_events(&session.id, None, None, &[], None, true)
            .await
            .unwrap();
        assert!(events.is_empty());

        // Deleting again reports absence.
        assert!(!store.delete_session(&SessionId::from("missing001")).await.unwrap());
    }

    #[tokio::test]
    async fn list_sessions_filters_are_anded() {
        let store = MemorySessionStore::new();
        let u1 = UserId::from("user000001");
        let u2 = UserId::from("user000002");
        let a1 = AgentId::from("agent00001");
        let a2 = AgentId::from("agent00002");

        for (user, agent) in [(&u1, &a1), (&u1, &a2), (&u2, &a1)] {
            store
                .create_session(user.clone(), agent.clone(), None, None, None, None)
                .await
                .unwrap();
        }

        assert_eq!(store.list_sessions(None, None).await.unwrap().len(), 3);
        assert_eq!(store.list_sessions(Some(&a1), None).await.unwrap().len(), 2);
        assert_eq!(store.list_sessions(None, Some(&u1)).await.unwrap().len(), 2);
        assert_eq!(
            store.list_sessions(Some(&a1), Some(&u1)).await.unwrap().len(),
            1
        );
        assert_eq!(
            store.list_sessions(Some(&a2), Some(&u2)).await.unwrap().len(),
            0
        );
    }

    // ── Events ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_event_assigns_sequential_offsets() {
        let (store, session) = session_with_store().await;
        for expected in 0..5 {
            let event =
                append(&store, &session.id, EventSource::User, EventType::Message, "c1").await;
            assert_eq!(event.offset, expected);
        }
    }

    #[tokio::test]
    async fn create_event_unknown_session_fails() {
        let store = MemorySessionStore::new();
        let err = store
            .create_event(
                &SessionId::from("missing001"),
                EventSource::User,
                EventType::Message,
                "c1",
                json!({}),
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_appends_keep_offsets_gap_free() {
        let (store, session) = session_with_store().await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let session_id = session.id.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    store
                        .create_event(
                            &session_id,
                            EventSource::AiAgent,
                            EventType::Status,
                            "c1",
                            json!({"type": "status", "status": "typing"}),
                            None,
                            None,
                        )
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let events = store
            .list_events(&session.id, None, None, &[], None, true)
            .await
            .unwrap();
        let mut offsets: Vec<u64> = events.iter().map(|e| e.offset).collect();
        offsets.sort_unstable();
        assert_eq!(offsets, (0..200).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn read_event_scoped_to_session() {
        let (store, session) = session_with_store().await;
        let event =
            append(&store, &session.id, EventSource::User, EventType::Message, "c1").await;

        let found = store.read_event(&session.id, &event.id).await.unwrap();
        assert_eq!(found.unwrap().id, event.id);

        let other = SessionId::from("other00001");
        assert!(store.read_event(&other, &event.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_events_filters() {
        let (store, session) = session_with_store().await;
        append(&store, &session.id, EventSource::User, EventType::Message, "c1").await;
        append(&store, &session.id, EventSource::AiAgent, EventType::Status, "c2").await;
        append(&store, &session.id, EventSource::AiAgent, EventType::Tool, "c2").await;

        let all = store
            .list_events(&session.id, None, None, &[], None, true)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        // Insertion order == offset order for non-deleted events.
        assert!(all.windows(2).all(|w| w[0].offset < w[1].offset));

        let from_user = store
            .list_events(&session.id, Some(EventSource::User), None, &[], None, true)
            .await
            .unwrap();
        assert_eq!(from_user.len(), 1);

        let by_correlation = store
            .list_events(&session.id, None, Some("c2"), &[], None, true)
            .await
            .unwrap();
        assert_eq!(by_correlation.len(), 2);

        let by_types = store
            .list_events(
                &session.id,
                None,
                None,
                &[EventType::Message, EventType::Tool],
                None,
                true,
            )
            .await
            .unwrap();
        assert_eq!(by_types.len(), 2);

        let from_offset = store
            .list_events(&session.id, None, None, &[], Some(2), true)
            .await
            .unwrap();
        assert_eq!(from_offset.len(), 1);
        assert_eq!(from_offset[0].offset, 2);
    }

    #[tokio::test]
    async fn delete_event_is_soft() {
        let (store, session) = session_with_store().await;
        let first =
            append(&store, &session.id, EventSource::User, EventType::Message, "c1").await;
        append(&store, &session.id, EventSource::AiAgent, EventType::Status, "c1").await;

        assert!(store.delete_event(&first.id).await.unwrap());
        assert!(!store.delete_event(&EventId::from("missing001")).await.unwrap());

        let visible = store
            .list_events(&session.id, None, None, &[], None, true)
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);

        let with_deleted = store
            .list_events(&session.id, None, None, &[], None, false)
            .await
            .unwrap();
        assert_eq!(with_deleted.len(), 2);
        assert!(with_deleted[0].deleted);
    }
}
