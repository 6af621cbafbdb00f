//! API key model - organization-owned credentials for machine callers.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub const API_KEY_PREFIX: &str = "ans_live_";

/// Characters of the raw key kept for display (`ans_live_` plus four).
const DISPLAY_PREFIX_LEN: usize = 13;

/// API key entity. The raw key is never stored, only its SHA-256 lookup hash.
#[derive(Debug, Clone, FromRow)]
pub struct ApiKey {
    pub api_key_id: Uuid,
    pub organization_id: Uuid,
    pub key_label: String,
    pub key_prefix: String,
    pub lookup_hash: String,
    pub rate_limit_per_window: Option<i32>,
    pub daily_quota: Option<i32>,
    pub active_flag: bool,
    pub expires_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub last_used_utc: Option<DateTime<Utc>>,
    pub revoked_utc: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Create a key record for `raw_key`.
    pub fn new(
        organization_id: Uuid,
        key_label: String,
        raw_key: &str,
        limits: ApiKeyLimits,
        expires_utc: Option<DateTime<Utc>>,
        created_utc: DateTime<Utc>,
    ) -> Self {
        Self {
            api_key_id: Uuid::new_v4(),
            organization_id,
            key_label,
            key_prefix: raw_key.chars().take(DISPLAY_PREFIX_LEN).collect(),
            lookup_hash: Self::calculate_lookup_hash(raw_key),
            rate_limit_per_window: limits.rate_limit_per_window.map(clamp_to_i32),
            daily_quota: limits.daily_quota.map(clamp_to_i32),
            active_flag: true,
            expires_utc,
            created_utc,
            last_used_utc: None,
            revoked_utc: None,
        }
    }

    pub fn generate_raw_key() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        format!("{}{}", API_KEY_PREFIX, URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn calculate_lookup_hash(raw_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(raw_key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Active and not past its expiry.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.active_flag && self.expires_utc.is_none_or(|expires| now < expires)
    }

    pub fn limits(&self) -> ApiKeyLimits {
        ApiKeyLimits {
            rate_limit_per_window: self
                .rate_limit_per_window
                .and_then(|v| u32::try_from(v).ok()),
            daily_quota: self.daily_quota.and_then(|v| u32::try_from(v).ok()),
        }
    }
}

fn clamp_to_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

/// Per-key ceilings. `None` falls back to the configured defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApiKeyLimits {
    pub rate_limit_per_window: Option<u32>,
    pub daily_quota: Option<u32>,
}

/// Identity a successfully admitted machine request carries downstream.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiKeyContext {
    pub key_id: Uuid,
    pub organization_id: Uuid,
}

/// Request to issue a new key for the caller's organization.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateApiKeyRequest {
    #[validate(length(min = 1, max = 100))]
    pub label: String,
    #[validate(range(min = 1))]
    pub rate_limit_per_window: Option<u32>,
    #[validate(range(min = 1))]
    pub daily_quota: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// API key response (never includes secret material).
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKeyResponse {
    pub key_id: Uuid,
    pub organization_id: Uuid,
    pub label: String,
    pub prefix: String,
    pub rate_limit_per_window: Option<i32>,
    pub daily_quota: Option<i32>,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<ApiKey> for ApiKeyResponse {
    fn from(k: ApiKey) -> Self {
        Self {
            key_id: k.api_key_id,
            organization_id: k.organization_id,
            label: k.key_label,
            prefix: k.key_prefix,
            rate_limit_per_window: k.rate_limit_per_window,
            daily_quota: k.daily_quota,
            active: k.active_flag,
            expires_at: k.expires_utc,
            created_at: k.created_utc,
            last_used_at: k.last_used_utc,
        }
    }
}

/// Issuance response. `api_key` is shown exactly once.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateApiKeyResponse {
    pub api_key: String,
    pub key: ApiKeyResponse,
}

/// Counter state for one window.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WindowUsage {
    pub window_start: DateTime<Utc>,
    pub used: u64,
    pub limit: u32,
}

/// Usage report for the calling key.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiKeyUsage {
    pub key_id: Uuid,
    pub organization_id: Uuid,
    pub rate_window: WindowUsage,
    pub daily: WindowUsage,
}
