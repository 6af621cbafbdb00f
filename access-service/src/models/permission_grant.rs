//! Permission grant model - scoped, time-bounded capabilities per organization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Capability tags a grant can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionScope {
    ViewReports,
    ManageExams,
    GradeSubmissions,
    ManageUsers,
    ManageBilling,
    ExportData,
    ManageIntegrations,
    ManagePermissions,
    ManageApiKeys,
}

impl PermissionScope {
    pub const ALL: [PermissionScope; 9] = [
        PermissionScope::ViewReports,
        PermissionScope::ManageExams,
        PermissionScope::GradeSubmissions,
        PermissionScope::ManageUsers,
        PermissionScope::ManageBilling,
        PermissionScope::ExportData,
        PermissionScope::ManageIntegrations,
        PermissionScope::ManagePermissions,
        PermissionScope::ManageApiKeys,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionScope::ViewReports => "VIEW_REPORTS",
            PermissionScope::ManageExams => "MANAGE_EXAMS",
            PermissionScope::GradeSubmissions => "GRADE_SUBMISSIONS",
            PermissionScope::ManageUsers => "MANAGE_USERS",
            PermissionScope::ManageBilling => "MANAGE_BILLING",
            PermissionScope::ExportData => "EXPORT_DATA",
            PermissionScope::ManageIntegrations => "MANAGE_INTEGRATIONS",
            PermissionScope::ManagePermissions => "MANAGE_PERMISSIONS",
            PermissionScope::ManageApiKeys => "MANAGE_API_KEYS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.to_ascii_uppercase();
        Self::ALL.into_iter().find(|scope| scope.as_str() == upper)
    }
}

impl std::fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission grant entity. Unique per (user, organization, scope).
#[derive(Debug, Clone, FromRow)]
pub struct PermissionGrant {
    pub grant_id: Uuid,
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub scope_code: String,
    pub granted_by: Uuid,
    pub expires_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl PermissionGrant {
    /// Create a new grant.
    pub fn new(
        user_id: Uuid,
        organization_id: Uuid,
        scope: PermissionScope,
        granted_by: Uuid,
        expires_utc: Option<DateTime<Utc>>,
        created_utc: DateTime<Utc>,
    ) -> Self {
        Self {
            grant_id: Uuid::new_v4(),
            user_id,
            organization_id,
            scope_code: scope.as_str().to_string(),
            granted_by,
            expires_utc,
            created_utc,
        }
    }

    /// A grant without expiry never lapses; otherwise it is active strictly
    /// before its expiry instant.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_utc.is_none_or(|expires| now < expires)
    }

    pub fn scope(&self) -> Option<PermissionScope> {
        PermissionScope::parse(&self.scope_code)
    }
}

/// Request to grant a scope inside the caller's organization.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateGrantRequest {
    pub user_id: Uuid,
    pub scope: PermissionScope,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Query for listing grants.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListGrantsQuery {
    pub user_id: Option<Uuid>,
}

/// Query for a single permission check.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CheckPermissionQuery {
    pub user_id: Option<Uuid>,
    pub scope: PermissionScope,
}

/// Permission check result.
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckPermissionResponse {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub scope: PermissionScope,
    pub allowed: bool,
}

/// Grant response for API.
#[derive(Debug, Serialize, ToSchema)]
pub struct GrantResponse {
    pub grant_id: Uuid,
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub scope: String,
    pub granted_by: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

impl GrantResponse {
    pub fn from_grant(g: PermissionGrant, now: DateTime<Utc>) -> Self {
        let active = g.is_active_at(now);
        Self {
            grant_id: g.grant_id,
            user_id: g.user_id,
            organization_id: g.organization_id,
            scope: g.scope_code,
            granted_by: g.granted_by,
            expires_at: g.expires_utc,
            created_at: g.created_utc,
            active,
        }
    }
}

/// Result of an organization-wide purge.
#[derive(Debug, Serialize, ToSchema)]
pub struct PurgeGrantsResponse {
    pub organization_id: Uuid,
    pub removed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn grant_expiring(at: Option<DateTime<Utc>>) -> PermissionGrant {
        PermissionGrant::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            PermissionScope::ViewReports,
            Uuid::new_v4(),
            at,
            Utc::now(),
        )
    }

    #[test]
    fn grant_without_expiry_is_always_active() {
        let grant = grant_expiring(None);
        let far_future = Utc::now() + Duration::days(365 * 50);
        assert!(grant.is_active_at(far_future));
    }

    #[test]
    fn grant_is_inactive_at_its_expiry_instant() {
        let expires = Utc::now() + Duration::hours(1);
        let grant = grant_expiring(Some(expires));
        assert!(grant.is_active_at(expires - Duration::milliseconds(1)));
        assert!(!grant.is_active_at(expires));
        assert!(!grant.is_active_at(expires + Duration::seconds(1)));
    }

    #[test]
    fn scope_parse_accepts_storage_codes() {
        for scope in PermissionScope::ALL {
            assert_eq!(PermissionScope::parse(scope.as_str()), Some(scope));
        }
        assert_eq!(PermissionScope::parse("nope"), None);
    }
}
