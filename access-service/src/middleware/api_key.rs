use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::{models::ApiKeyContext, services::ServiceError, AppState};

pub const API_KEY_HEADERS: [&str; 2] = ["x-api-key", "x-apikey"];

fn presented_key(headers: &HeaderMap) -> Option<&str> {
    API_KEY_HEADERS
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

/// Admit machine requests: key validation, rate window, then daily quota.
pub async fn api_key_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let raw_key = presented_key(req.headers()).ok_or(ServiceError::MissingApiKey)?;
    let context = state.api_keys.admit(raw_key).await?;

    tracing::debug!(
        key_id = %context.key_id,
        organization_id = %context.organization_id,
        "API key admitted"
    );

    req.extensions_mut().insert(context);
    Ok(next.run(req).await)
}

/// Extractor for the admitted key's context.
pub struct ApiKeyAuth(pub ApiKeyContext);

#[async_trait]
impl<S> FromRequestParts<S> for ApiKeyAuth
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts.extensions.get::<ApiKeyContext>().cloned().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "API key context missing from request extensions"
            ))
        })?;
        Ok(ApiKeyAuth(context))
    }
}
