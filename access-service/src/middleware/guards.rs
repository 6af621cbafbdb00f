//! Route guards layered after `session_auth_middleware`.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::{
    middleware::CurrentUser,
    models::{PermissionScope, Role},
    services::{PermissionService, ServiceError},
};

/// State for [`require_permission`]: the evaluator and the scope a route needs.
#[derive(Clone)]
pub struct PermissionGuard {
    pub permissions: PermissionService,
    pub scope: PermissionScope,
}

impl PermissionGuard {
    pub fn new(permissions: PermissionService, scope: PermissionScope) -> Self {
        Self { permissions, scope }
    }
}

pub async fn require_permission(
    State(guard): State<PermissionGuard>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let current = current_user(&req)?;
    let organization_id = current.organization_id()?;

    if !guard
        .permissions
        .evaluate(&current.user, organization_id, guard.scope)
        .await
    {
        tracing::warn!(
            user_id = %current.user.user_id,
            organization_id = %organization_id,
            required_scope = %guard.scope,
            "Insufficient permissions"
        );
        return Err(ServiceError::Forbidden(format!(
            "Missing permission {}",
            guard.scope
        ))
        .into());
    }

    Ok(next.run(req).await)
}

/// State for [`require_role`]: any one of `roles` admits.
#[derive(Debug, Clone)]
pub struct RoleGuard {
    pub roles: Vec<Role>,
}

impl RoleGuard {
    pub fn new(roles: impl Into<Vec<Role>>) -> Self {
        Self {
            roles: roles.into(),
        }
    }
}

pub async fn require_role(
    State(guard): State<RoleGuard>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let current = current_user(&req)?;

    if !guard.roles.iter().any(|role| current.user.has_role(*role)) {
        tracing::warn!(
            user_id = %current.user.user_id,
            role = %current.user.role_code,
            required_roles = ?guard.roles,
            "Insufficient role"
        );
        return Err(ServiceError::Forbidden("Insufficient role".to_string()).into());
    }

    Ok(next.run(req).await)
}

fn current_user(req: &Request) -> Result<CurrentUser, AppError> {
    req.extensions().get::<CurrentUser>().cloned().ok_or_else(|| {
        AppError::InternalError(anyhow::anyhow!(
            "Session user missing from request extensions"
        ))
    })
}
