//! Agent endpoints.
//!
//! - `POST /api/agents`      — register an agent definition
//! - `GET  /api/agents/{id}` — fetch one agent
//! - `GET  /api/agents`      — list all agents

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use mur_domain::agent::Agent;
use mur_domain::ids::AgentId;

use crate::api::error::{ApiError, ValidJson};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AgentCreationParams {
    pub name: String,
    /// Runner selector (see the runner registry).
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AgentsDTO {
    pub data: Vec<Agent>,
}

pub async fn create_agent(
    State(state): State<AppState>,
    ValidJson(params): ValidJson<AgentCreationParams>,
) -> Result<(StatusCode, Json<Agent>), ApiError> {
    state.auth.authenticate().await?;

    let agent = state
        .agents
        .create_agent(params.name, params.kind, params.description, None)
        .await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

pub async fn read_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<AgentId>,
) -> Result<Json<Agent>, ApiError> {
    state
        .agents
        .read_agent(&agent_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Agent with ID {agent_id} not found")))
}

pub async fn list_agents(State(state): State<AppState>) -> Result<Json<AgentsDTO>, ApiError> {
    let data = state.agents.list_agents().await?;
    Ok(Json(AgentsDTO { data }))
}
