//! API key lifecycle for organization managers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    middleware::CurrentUser,
    models::{ApiKeyLimits, ApiKeyResponse, CreateApiKeyRequest, CreateApiKeyResponse},
    utils::ValidatedJson,
    AppState,
};

#[utoipa::path(
    get,
    path = "/api-keys",
    responses(
        (status = 200, description = "Keys of the organization", body = [ApiKeyResponse]),
        (status = 403, description = "Missing MANAGE_API_KEYS")
    ),
    tag = "API Keys",
    security(("bearer_auth" = []))
)]
pub async fn list_api_keys(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<ApiKeyResponse>>, AppError> {
    let organization_id = current.organization_id()?;
    Ok(Json(state.api_keys.list(organization_id).await?))
}

/// Issue a key. The raw key appears in this response only.
#[utoipa::path(
    post,
    path = "/api-keys",
    request_body = CreateApiKeyRequest,
    responses(
        (status = 201, description = "Key issued", body = CreateApiKeyResponse),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Missing MANAGE_API_KEYS")
    ),
    tag = "API Keys",
    security(("bearer_auth" = []))
)]
pub async fn create_api_key(
    State(state): State<AppState>,
    current: CurrentUser,
    ValidatedJson(req): ValidatedJson<CreateApiKeyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let organization_id = current.organization_id()?;
    let limits = ApiKeyLimits {
        rate_limit_per_window: req.rate_limit_per_window,
        daily_quota: req.daily_quota,
    };
    let (raw_key, key) = state
        .api_keys
        .issue(organization_id, req.label, limits, req.expires_at)
        .await?;

    tracing::info!(
        key_id = %key.api_key_id,
        issued_by = %current.user.user_id,
        "API key created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateApiKeyResponse {
            api_key: raw_key,
            key: ApiKeyResponse::from(key),
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/api-keys/{key_id}",
    params(("key_id" = Uuid, Path, description = "Key to revoke")),
    responses(
        (status = 204, description = "Key revoked"),
        (status = 403, description = "Missing MANAGE_API_KEYS"),
        (status = 404, description = "No such key in this organization")
    ),
    tag = "API Keys",
    security(("bearer_auth" = []))
)]
pub async fn revoke_api_key(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(key_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let organization_id = current.organization_id()?;
    state.api_keys.revoke(organization_id, key_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
