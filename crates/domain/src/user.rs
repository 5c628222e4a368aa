//! Users. `sub` is the external subject an authentication layer resolves;
//! the no-op handler maps every request to the anonymous subject.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::UserId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// External subject identifier.
    pub sub: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(
        &self,
        sub: String,
        name: String,
        email: Option<String>,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<User>;

    async fn read_user(&self, user_id: &UserId) -> Result<Option<User>>;

    async fn read_user_by_sub(&self, sub: &str) -> Result<Option<User>>;
}
