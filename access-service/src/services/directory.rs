use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::{Role, User};
use crate::services::ServiceError;

/// Read access to identity records plus the one mutation this service owns:
/// an admin changing a user's role.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, ServiceError>;
    /// Returns the updated user, or `None` when no such user exists.
    async fn update_role(&self, user_id: Uuid, role: Role) -> Result<Option<User>, ServiceError>;
    async fn health_check(&self) -> Result<(), ServiceError>;
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: DashMap<Uuid, User>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        self.users.insert(user.user_id, user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn update_role(&self, user_id: Uuid, role: Role) -> Result<Option<User>, ServiceError> {
        Ok(self.users.get_mut(&user_id).map(|mut u| {
            u.role_code = role.as_str().to_string();
            u.clone()
        }))
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}
