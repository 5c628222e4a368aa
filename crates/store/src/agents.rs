//! Agent store backed by the in-memory `agents` collection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use mur_domain::agent::{Agent, AgentStore};
use mur_domain::error::Result;
use mur_domain::ids::AgentId;

use crate::STORE_VERSION;

struct AgentRecord {
    agent: Agent,
    #[allow(dead_code)]
    version: &'static str,
}

#[derive(Default)]
pub struct MemoryAgentStore {
    agents: RwLock<Vec<AgentRecord>>,
}

impl MemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentStore for MemoryAgentStore {
    async fn create_agent(
        &self,
        name: String,
        kind: String,
        description: Option<String>,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<Agent> {
        let agent = Agent {
            id: AgentId::generate(),
            kind,
            name,
            description,
            created_at: created_at.unwrap_or_else(Utc::now),
        };
        self.agents.write().push(AgentRecord {
            agent: agent.clone(),
            version: STORE_VERSION,
        });
        Ok(agent)
    }

    async fn read_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>> {
        Ok(self
            .agents
            .read()
            .iter()
            .find(|r| &r.agent.id == agent_id)
            .map(|r| r.agent.clone()))
    }

    async fn list_agents(&self) -> Result<Vec<Agent>> {
        Ok(self.agents.read().iter().map(|r| r.agent.clone()).collect())
    }

    async fn delete_agent(&self, agent_id: &AgentId) -> Result<bool> {
        let mut agents = self.agents.write();
        let before = agents.len();
        agents.retain(|r| &r.agent.id != agent_id);
        Ok(agents.len() < before)
    }
}
