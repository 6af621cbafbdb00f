//! Permission check and grant management endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    middleware::CurrentUser,
    models::{
        CheckPermissionQuery, CheckPermissionResponse, CreateGrantRequest, GrantResponse,
        ListGrantsQuery, PermissionScope, PurgeGrantsResponse,
    },
    services::ServiceError,
    utils::ValidatedJson,
    AppState,
};

/// Ask whether a user holds a scope in the current organization.
///
/// Checking someone other than yourself needs MANAGE_PERMISSIONS.
#[utoipa::path(
    get,
    path = "/permissions/check",
    params(CheckPermissionQuery),
    responses(
        (status = 200, description = "Decision returned", body = CheckPermissionResponse),
        (status = 400, description = "Missing organization or bad query"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Not allowed to inspect other users")
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn check_permission(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<CheckPermissionQuery>,
) -> Result<Json<CheckPermissionResponse>, AppError> {
    let organization_id = current.organization_id()?;
    let target = query.user_id.unwrap_or(current.user.user_id);

    if target != current.user.user_id
        && !state
            .permissions
            .evaluate(&current.user, organization_id, PermissionScope::ManagePermissions)
            .await
    {
        return Err(ServiceError::Forbidden(format!(
            "Missing permission {}",
            PermissionScope::ManagePermissions
        ))
        .into());
    }

    let allowed = state
        .permissions
        .has_permission(target, organization_id, query.scope)
        .await;

    Ok(Json(CheckPermissionResponse {
        user_id: target,
        organization_id,
        scope: query.scope,
        allowed,
    }))
}

#[utoipa::path(
    get,
    path = "/permissions",
    params(ListGrantsQuery),
    responses(
        (status = 200, description = "Grants in the organization", body = [GrantResponse]),
        (status = 403, description = "Missing MANAGE_PERMISSIONS")
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<ListGrantsQuery>,
) -> Result<Json<Vec<GrantResponse>>, AppError> {
    let organization_id = current.organization_id()?;
    let grants = state
        .permissions
        .list_grants(organization_id, query.user_id)
        .await?;
    Ok(Json(grants))
}

#[utoipa::path(
    post,
    path = "/permissions",
    request_body = CreateGrantRequest,
    responses(
        (status = 201, description = "Grant created", body = GrantResponse),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Missing MANAGE_PERMISSIONS"),
        (status = 404, description = "Target user not found"),
        (status = 409, description = "Grant already exists")
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn create_permission(
    State(state): State<AppState>,
    current: CurrentUser,
    ValidatedJson(req): ValidatedJson<CreateGrantRequest>,
) -> Result<impl IntoResponse, AppError> {
    let organization_id = current.organization_id()?;
    let grant = state
        .permissions
        .grant(
            req.user_id,
            organization_id,
            req.scope,
            current.user.user_id,
            req.expires_at,
        )
        .await?;

    let now = state.permissions.now();
    Ok((StatusCode::CREATED, Json(GrantResponse::from_grant(grant, now))))
}

#[utoipa::path(
    delete,
    path = "/permissions/{user_id}/{scope}",
    params(
        ("user_id" = Uuid, Path, description = "User holding the grant"),
        ("scope" = String, Path, description = "Scope to revoke, e.g. VIEW_REPORTS")
    ),
    responses(
        (status = 204, description = "Grant revoked"),
        (status = 403, description = "Missing MANAGE_PERMISSIONS"),
        (status = 404, description = "No such grant")
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn revoke_permission(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((user_id, scope)): Path<(Uuid, String)>,
) -> Result<StatusCode, AppError> {
    let organization_id = current.organization_id()?;
    let scope = PermissionScope::parse(&scope)
        .ok_or_else(|| ServiceError::Validation(format!("Unknown scope {}", scope)))?;

    state
        .permissions
        .revoke(user_id, organization_id, scope)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Remove every grant in the current organization.
#[utoipa::path(
    delete,
    path = "/permissions",
    responses(
        (status = 200, description = "Grants removed", body = PurgeGrantsResponse),
        (status = 403, description = "Caller is not an administrator")
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn purge_permissions(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<PurgeGrantsResponse>, AppError> {
    let organization_id = current.organization_id()?;
    let removed = state.permissions.purge_organization(organization_id).await?;
    Ok(Json(PurgeGrantsResponse {
        organization_id,
        removed,
    }))
}
