use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::AppState;

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "A backing store is unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state.permissions.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Grant store health check failed");
        AppError::ServiceUnavailable
    })?;
    state.api_keys.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "API key store health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
    })))
}

pub async fn metrics() -> impl IntoResponse {
    crate::services::metrics::get_metrics()
}
