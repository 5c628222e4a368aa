//! Request authentication. The only configured handler is the no-op one:
//! every request acts as the anonymous user, created on first use.

use std::sync::Arc;

use async_trait::async_trait;

use mur_domain::error::Result;
use mur_domain::user::{User, UserStore};

pub const ANONYMOUS_SUB: &str = "anonymous";

#[async_trait]
pub trait AuthHandler: Send + Sync {
    /// Resolve the user making the current request.
    async fn authenticate(&self) -> Result<User>;
}

pub struct NoopAuthHandler {
    users: Arc<dyn UserStore>,
}

impl NoopAuthHandler {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl AuthHandler for NoopAuthHandler {
    async fn authenticate(&self) -> Result<User> {
        if let Some(user) = self.users.read_user_by_sub(ANONYMOUS_SUB).await? {
            return Ok(user);
        }
        self.users
            .create_user(ANONYMOUS_SUB.to_owned(), "Anonymous".to_owned(), None, None)
            .await
    }
}
