use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::services::ServiceError;

/// Signs and verifies the bearer tokens users present to this service.
#[derive(Clone)]
pub struct SessionTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiry_minutes: i64,
}

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

impl SessionTokens {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            token_expiry_minutes: config.token_expiry_minutes,
        }
    }

    pub fn issue(&self, user_id: Uuid) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            exp: (now + Duration::minutes(self.token_expiry_minutes)).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to encode session token: {}", e)))
    }

    /// Verify signature and expiry, returning the user the token names.
    pub fn verify(&self, token: &str) -> Result<Uuid, ServiceError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                tracing::debug!(error = %e, "Session token rejected");
                ServiceError::Unauthenticated("Invalid or expired session token")
            })?;
        Uuid::parse_str(&data.claims.sub)
            .map_err(|_| ServiceError::Unauthenticated("Invalid session subject"))
    }
}
