use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

use crate::models::PermissionScope;

pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
pub const QUOTA_EXCEEDED: &str = "QUOTA_EXCEEDED";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error("Missing API key header")]
    MissingApiKey,

    #[error("{0}")]
    Forbidden(String),

    #[error("Rate limit of {limit} requests per window exceeded")]
    RateLimitExceeded { limit: u32, retry_after_secs: u64 },

    #[error("Daily quota of {limit} requests exceeded")]
    QuotaExceeded { limit: u32, retry_after_secs: u64 },

    #[error("Permission {scope} already granted to user {user_id} in organization {organization_id}")]
    DuplicateGrant {
        user_id: Uuid,
        organization_id: Uuid,
        scope: PermissionScope,
    },

    #[error("No {scope} grant for user {user_id} in organization {organization_id}")]
    GrantNotFound {
        user_id: Uuid,
        organization_id: Uuid,
        scope: PermissionScope,
    },

    #[error("User not found")]
    UserNotFound,

    #[error("API key not found")]
    ApiKeyNotFound,

    #[error("Organization id is required for this request")]
    MissingOrganization,

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Redis(e) => AppError::RedisError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::Unauthenticated(_) => AppError::Unauthorized(anyhow::anyhow!(message)),
            ServiceError::Forbidden(_) => AppError::Forbidden(anyhow::anyhow!(message)),
            ServiceError::RateLimitExceeded {
                retry_after_secs, ..
            } => AppError::LimitExceeded(RATE_LIMIT_EXCEEDED, message, Some(retry_after_secs)),
            ServiceError::QuotaExceeded {
                retry_after_secs, ..
            } => AppError::LimitExceeded(QUOTA_EXCEEDED, message, Some(retry_after_secs)),
            ServiceError::DuplicateGrant { .. } => AppError::Conflict(anyhow::anyhow!(message)),
            ServiceError::GrantNotFound { .. }
            | ServiceError::UserNotFound
            | ServiceError::ApiKeyNotFound => AppError::NotFound(anyhow::anyhow!(message)),
            ServiceError::MissingApiKey
            | ServiceError::MissingOrganization
            | ServiceError::Validation(_) => AppError::BadRequest(anyhow::anyhow!(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_core::axum::{http::StatusCode, response::IntoResponse};

    fn status_of(err: ServiceError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn taxonomy_maps_to_documented_statuses() {
        assert_eq!(status_of(ServiceError::MissingApiKey), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(ServiceError::Unauthenticated("Invalid API key")),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(ServiceError::RateLimitExceeded {
                limit: 5,
                retry_after_secs: 10
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(ServiceError::QuotaExceeded {
                limit: 5,
                retry_after_secs: 10
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(ServiceError::Forbidden("Insufficient scope".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(ServiceError::MissingOrganization),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ServiceError::DuplicateGrant {
                user_id: Uuid::nil(),
                organization_id: Uuid::nil(),
                scope: PermissionScope::ViewReports,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ServiceError::GrantNotFound {
                user_id: Uuid::nil(),
                organization_id: Uuid::nil(),
                scope: PermissionScope::ViewReports,
            }),
            StatusCode::NOT_FOUND
        );
    }
}
