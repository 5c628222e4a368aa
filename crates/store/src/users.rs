//! User store backed by the in-memory `users` collection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use mur_domain::error::Result;
use mur_domain::ids::UserId;
use mur_domain::user::{User, UserStore};

use crate::STORE_VERSION;

struct UserRecord {
    user: User,
    #[allow(dead_code)]
    version: &'static str,
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_user(
        &self,
        sub: String,
        name: String,
        email: Option<String>,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<User> {
        let user = User {
            id: UserId::generate(),
            sub,
            name,
            email,
            created_at: created_at.unwrap_or_else(Utc::now),
        };
        self.users.write().push(UserRecord {
            user: user.clone(),
            version: STORE_VERSION,
        });
        Ok(user)
    }

    async fn read_user(&self, user_id: &UserId) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .iter()
            .find(|r| &r.user.id == user_id)
            .map(|r| r.user.clone()))
    }

    async fn read_user_by_sub(&self, sub: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .iter()
            .find(|r| r.user.sub == sub)
            .map(|r| r.user.clone()))
    }
}
