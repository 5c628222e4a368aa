//! Agent definitions. An agent's `type` is the tag that selects a runner
//! implementation; the record itself is immutable after creation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::AgentId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    /// Runner selector, e.g. `"echo"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn create_agent(
        &self,
        name: String,
        kind: String,
        description: Option<String>,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<Agent>;

    async fn read_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>>;

    async fn list_agents(&self) -> Result<Vec<Agent>>;

    /// Returns whether the agent existed.
    async fn delete_agent(&self, agent_id: &AgentId) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_serializes_kind_as_type() {
        let agent = Agent {
            id: AgentId::from("fxjwGfAIYV"),
            kind: "echo".into(),
            name: "Echo".into(),
            description: None,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&agent).unwrap();
        assert_eq!(value["type"], "echo");
        assert!(value.get("kind").is_none());
        assert!(value.get("description").is_none());
    }
}
