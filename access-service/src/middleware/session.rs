use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{models::User, services::ServiceError, AppState};

pub const ORGANIZATION_HEADER: &str = "x-organization-id";

/// The signed-in user and the organization the request acts in.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    organization_id: Option<Uuid>,
}

impl CurrentUser {
    pub fn new(user: User, organization_id: Option<Uuid>) -> Self {
        Self {
            user,
            organization_id,
        }
    }

    /// Organization selected by header, falling back to the user's own.
    pub fn organization_id(&self) -> Result<Uuid, ServiceError> {
        self.organization_id.ok_or(ServiceError::MissingOrganization)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn requested_organization(headers: &HeaderMap) -> Result<Option<Uuid>, ServiceError> {
    match headers.get(ORGANIZATION_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(Some)
            .ok_or_else(|| ServiceError::Validation(format!("Invalid {} header", ORGANIZATION_HEADER))),
    }
}

/// Resolve the bearer session to a known user.
pub async fn session_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())
        .ok_or(ServiceError::Unauthenticated("Missing or invalid Authorization header"))?;
    let user_id = state.sessions.verify(token)?;

    let user = state
        .permissions
        .find_user(user_id)
        .await?
        .ok_or(ServiceError::Unauthenticated("Session user no longer exists"))?;

    let organization_id = requested_organization(req.headers())?.or(user.organization_id);
    tracing::debug!(
        user_id = %user.user_id,
        organization_id = ?organization_id,
        "Session authenticated"
    );

    req.extensions_mut()
        .insert(CurrentUser::new(user, organization_id));
    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<CurrentUser>().cloned().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Session user missing from request extensions"
            ))
        })
    }
}
