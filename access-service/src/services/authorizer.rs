//! Authorization evaluator and grant management.
//!
//! A permission check walks an ordered list of [`AccessRule`]s and stops at
//! the first one that allows. Nothing allowing means deny.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{GrantResponse, PermissionGrant, PermissionScope, Role, User};
use crate::services::clock::Clock;
use crate::services::directory::UserDirectory;
use crate::services::grant_store::GrantStore;
use crate::services::metrics;
use crate::services::ServiceError;

/// One permission question, resolved against a loaded user.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    pub user: &'a User,
    pub organization_id: Uuid,
    pub scope: PermissionScope,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Defer to the next rule.
    Pass,
}

#[async_trait]
pub trait AccessRule: Send + Sync {
    fn name(&self) -> &'static str;
    async fn evaluate(&self, request: &AccessRequest<'_>) -> Result<Decision, ServiceError>;
}

/// Allows everything for holders of a role, without touching grant storage.
pub struct RoleBypass {
    role: Role,
}

impl RoleBypass {
    pub fn new(role: Role) -> Self {
        Self { role }
    }
}

#[async_trait]
impl AccessRule for RoleBypass {
    fn name(&self) -> &'static str {
        "role_bypass"
    }

    async fn evaluate(&self, request: &AccessRequest<'_>) -> Result<Decision, ServiceError> {
        Ok(if request.user.has_role(self.role) {
            Decision::Allow
        } else {
            Decision::Pass
        })
    }
}

/// Allows when an unexpired grant exists for (user, organization, scope).
pub struct ScopedGrantRule {
    grants: Arc<dyn GrantStore>,
}

impl ScopedGrantRule {
    pub fn new(grants: Arc<dyn GrantStore>) -> Self {
        Self { grants }
    }
}

#[async_trait]
impl AccessRule for ScopedGrantRule {
    fn name(&self) -> &'static str {
        "scoped_grant"
    }

    async fn evaluate(&self, request: &AccessRequest<'_>) -> Result<Decision, ServiceError> {
        let grant = self
            .grants
            .find_active_grant(
                request.user.user_id,
                request.organization_id,
                request.scope,
                request.now,
            )
            .await?;
        Ok(if grant.is_some() {
            Decision::Allow
        } else {
            Decision::Pass
        })
    }
}

#[derive(Clone)]
pub struct PermissionService {
    users: Arc<dyn UserDirectory>,
    grants: Arc<dyn GrantStore>,
    clock: Arc<dyn Clock>,
    rules: Arc<Vec<Box<dyn AccessRule>>>,
}

impl PermissionService {
    /// Standard rule chain: ADMIN bypass, then scoped grants.
    pub fn new(
        users: Arc<dyn UserDirectory>,
        grants: Arc<dyn GrantStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let rules: Vec<Box<dyn AccessRule>> = vec![
            Box::new(RoleBypass::new(Role::Admin)),
            Box::new(ScopedGrantRule::new(grants.clone())),
        ];
        Self::with_rules(users, grants, clock, rules)
    }

    pub fn with_rules(
        users: Arc<dyn UserDirectory>,
        grants: Arc<dyn GrantStore>,
        clock: Arc<dyn Clock>,
        rules: Vec<Box<dyn AccessRule>>,
    ) -> Self {
        Self {
            users,
            grants,
            clock,
            rules: Arc::new(rules),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        self.users.find_user(user_id).await
    }

    /// Never fails: unknown users and store errors evaluate to `false`.
    pub async fn has_permission(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        scope: PermissionScope,
    ) -> bool {
        let user = match self.users.find_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::debug!(user_id = %user_id, "Permission check for unknown user");
                metrics::record_authorization(scope, false);
                return false;
            }
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "User lookup failed during permission check");
                metrics::record_authorization(scope, false);
                return false;
            }
        };
        let allowed = self.evaluate(&user, organization_id, scope).await;
        metrics::record_authorization(scope, allowed);
        allowed
    }

    /// Run the rule chain for an already-loaded user.
    pub async fn evaluate(&self, user: &User, organization_id: Uuid, scope: PermissionScope) -> bool {
        let request = AccessRequest {
            user,
            organization_id,
            scope,
            now: self.clock.now(),
        };

        for rule in self.rules.iter() {
            match rule.evaluate(&request).await {
                Ok(Decision::Allow) => {
                    tracing::debug!(
                        user_id = %user.user_id,
                        organization_id = %organization_id,
                        scope = %scope,
                        rule = rule.name(),
                        "Access allowed"
                    );
                    return true;
                }
                Ok(Decision::Pass) => continue,
                Err(e) => {
                    tracing::error!(
                        user_id = %user.user_id,
                        organization_id = %organization_id,
                        scope = %scope,
                        rule = rule.name(),
                        error = %e,
                        "Access rule failed, denying"
                    );
                    return false;
                }
            }
        }
        false
    }

    pub async fn grant(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        scope: PermissionScope,
        granted_by: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<PermissionGrant, ServiceError> {
        let now = self.clock.now();
        if expires_at.is_some_and(|expires| expires <= now) {
            return Err(ServiceError::Validation(
                "expires_at must be in the future".to_string(),
            ));
        }
        if self.users.find_user(user_id).await?.is_none() {
            return Err(ServiceError::UserNotFound);
        }

        let grant = PermissionGrant::new(user_id, organization_id, scope, granted_by, expires_at, now);
        self.grants.insert_grant(&grant).await?;

        tracing::info!(
            grant_id = %grant.grant_id,
            user_id = %user_id,
            organization_id = %organization_id,
            scope = %scope,
            granted_by = %granted_by,
            "Permission granted"
        );
        Ok(grant)
    }

    pub async fn revoke(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        scope: PermissionScope,
    ) -> Result<(), ServiceError> {
        if !self.grants.delete_grant(user_id, organization_id, scope).await? {
            return Err(ServiceError::GrantNotFound {
                user_id,
                organization_id,
                scope,
            });
        }
        tracing::info!(
            user_id = %user_id,
            organization_id = %organization_id,
            scope = %scope,
            "Permission revoked"
        );
        Ok(())
    }

    pub async fn list_grants(
        &self,
        organization_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<Vec<GrantResponse>, ServiceError> {
        let now = self.clock.now();
        let grants = self.grants.list_grants(organization_id, user_id).await?;
        Ok(grants
            .into_iter()
            .map(|g| GrantResponse::from_grant(g, now))
            .collect())
    }

    pub async fn purge_organization(&self, organization_id: Uuid) -> Result<u64, ServiceError> {
        let removed = self.grants.delete_organization_grants(organization_id).await?;
        tracing::warn!(
            organization_id = %organization_id,
            removed,
            "Organization grants purged"
        );
        Ok(removed)
    }

    pub async fn set_role(&self, actor: &User, user_id: Uuid, role: Role) -> Result<User, ServiceError> {
        if !actor.has_role(Role::Admin) {
            return Err(ServiceError::Forbidden(
                "Only administrators can change roles".to_string(),
            ));
        }
        let user = self
            .users
            .update_role(user_id, role)
            .await?
            .ok_or(ServiceError::UserNotFound)?;
        tracing::info!(
            user_id = %user_id,
            role = %role,
            changed_by = %actor.user_id,
            "User role changed"
        );
        Ok(user)
    }

    pub async fn health_check(&self) -> Result<(), ServiceError> {
        self.users.health_check().await?;
        self.grants.health_check().await
    }
}
