//! HTTP API surface.
//!
//! Every request runs inside a fresh correlation scope `RID(<id>)`, so the
//! correlation ids of turns started by a request compose as
//! `RID(<id>)::<turn-id>`.

pub mod agents;
pub mod auth;
pub mod error;
pub mod sessions;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;

use mur_domain::ids::gen_id;
use mur_runtime::correlator::ContextualCorrelator;

use crate::state::AppState;

/// Build the full API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/agents",
            post(agents::create_agent).get(agents::list_agents),
        )
        .route("/api/agents/:agent_id", get(agents::read_agent))
        .route("/api/sessions", post(sessions::create_session))
        .route("/api/sessions/:session_id", get(sessions::read_session))
        .route(
            "/api/sessions/:session_id/events/stream",
            post(sessions::create_event_and_stream),
        )
        .route(
            "/api/sessions/:session_id/events",
            get(sessions::list_events),
        )
        .layer(middleware::from_fn(correlation_scope))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Wrap each request in a request-scoped correlation id.
async fn correlation_scope(request: Request, next: Next) -> Response {
    let request_id = gen_id();
    ContextualCorrelator::scope(format!("RID({request_id})"), next.run(request)).await
}
