//! User model - identity record consulted by the authorization evaluator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Platform roles. Only `Admin` carries authorization weight by itself;
/// everything else goes through scoped grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Instructor,
    TestTaker,
    Reviewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Instructor => "INSTRUCTOR",
            Role::TestTaker => "TEST_TAKER",
            Role::Reviewer => "REVIEWER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Role::Admin),
            "INSTRUCTOR" => Some(Role::Instructor),
            "TEST_TAKER" => Some(Role::TestTaker),
            "REVIEWER" => Some(Role::Reviewer),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User entity.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub email: String,
    pub display_name: Option<String>,
    pub role_code: String,
    pub created_utc: DateTime<Utc>,
}

impl User {
    /// Create a new user.
    pub fn new(email: String, role: Role, organization_id: Option<Uuid>) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            organization_id,
            email,
            display_name: None,
            role_code: role.as_str().to_string(),
            created_utc: Utc::now(),
        }
    }

    /// Role as enum. Unknown codes yield `None` and grant nothing.
    pub fn role(&self) -> Option<Role> {
        Role::parse(&self.role_code)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role() == Some(role)
    }
}

/// Request to change a user's role.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SetRoleRequest {
    pub role: Role,
}

/// User response for API.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
    pub created_utc: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            user_id: u.user_id,
            organization_id: u.organization_id,
            email: u.email,
            display_name: u.display_name,
            role: u.role_code,
            created_utc: u.created_utc,
        }
    }
}
