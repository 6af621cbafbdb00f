//! Endpoints for machine clients behind the API key gate.

use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::{middleware::ApiKeyAuth, models::ApiKeyUsage, AppState};

#[utoipa::path(
    get,
    path = "/external/v1/usage",
    responses(
        (status = 200, description = "Counters for the calling key", body = ApiKeyUsage),
        (status = 400, description = "API key header missing"),
        (status = 401, description = "Unknown, revoked or expired key"),
        (status = 403, description = "Rate limit or daily quota exceeded")
    ),
    tag = "External",
    security(("api_key" = []))
)]
pub async fn usage(
    State(state): State<AppState>,
    ApiKeyAuth(context): ApiKeyAuth,
) -> Result<Json<ApiKeyUsage>, AppError> {
    Ok(Json(state.api_keys.usage(context.key_id).await?))
}
