use std::sync::Arc;

use mur_domain::agent::AgentStore;
use mur_domain::config::Config;
use mur_domain::session::SessionStore;
use mur_domain::user::UserStore;
use mur_runtime::tasks::BackgroundTaskService;
use mur_stream::emitter::MemoryEventEmitter;

use crate::api::auth::AuthHandler;
use crate::runtime::service::SessionService;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Stores** — users, agents, sessions + their event logs
/// - **Streaming** — the emitter the SSE bridge subscribes to
/// - **Runtime** — the session service and the background-task registry
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Stores ────────────────────────────────────────────────────────
    pub users: Arc<dyn UserStore>,
    pub agents: Arc<dyn AgentStore>,
    pub sessions: Arc<dyn SessionStore>,

    // ── Streaming ─────────────────────────────────────────────────────
    pub emitter: Arc<MemoryEventEmitter>,

    // ── Runtime ───────────────────────────────────────────────────────
    pub session_service: Arc<SessionService>,
    pub tasks: Arc<BackgroundTaskService>,

    // ── Auth ──────────────────────────────────────────────────────────
    pub auth: Arc<dyn AuthHandler>,
}
