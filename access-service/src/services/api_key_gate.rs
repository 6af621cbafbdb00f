//! Admission control for machine clients: key validation, a rolling rate
//! window and a UTC daily quota, plus key lifecycle management.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::{
    ApiKey, ApiKeyContext, ApiKeyLimits, ApiKeyResponse, ApiKeyUsage, WindowUsage,
};
use crate::services::clock::Clock;
use crate::services::counter::{CounterStore, CounterWindow, WindowedCount};
use crate::services::api_key_store::ApiKeyStore;
use crate::services::metrics;
use crate::services::ServiceError;

/// Ceilings applied when a key carries no override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDefaults {
    pub rate_limit_per_window: u32,
    pub rate_window: Duration,
    pub daily_quota: u32,
}

impl Default for GateDefaults {
    fn default() -> Self {
        Self {
            rate_limit_per_window: 60,
            rate_window: Duration::seconds(60),
            daily_quota: 10_000,
        }
    }
}

/// Outcome of counting one request against a window.
#[derive(Debug, Clone, Copy)]
pub struct LimitCheck {
    pub allowed: bool,
    pub limit: u32,
    pub window: WindowedCount,
}

#[derive(Clone)]
pub struct ApiKeyGate {
    keys: Arc<dyn ApiKeyStore>,
    counters: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    defaults: GateDefaults,
}

impl ApiKeyGate {
    pub fn new(
        keys: Arc<dyn ApiKeyStore>,
        counters: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        defaults: GateDefaults,
    ) -> Self {
        Self {
            keys,
            counters,
            clock,
            defaults,
        }
    }

    fn rate_counter_key(key_id: Uuid) -> String {
        format!("apikey:{}:rate", key_id)
    }

    fn daily_counter_key(key_id: Uuid) -> String {
        format!("apikey:{}:daily", key_id)
    }

    fn rate_window(&self) -> CounterWindow {
        CounterWindow::Rolling(self.defaults.rate_window)
    }

    fn effective_limits(&self, key: &ApiKey) -> (u32, u32) {
        let limits = key.limits();
        (
            limits
                .rate_limit_per_window
                .unwrap_or(self.defaults.rate_limit_per_window),
            limits.daily_quota.unwrap_or(self.defaults.daily_quota),
        )
    }

    /// Resolve a presented raw key to a usable key record.
    pub async fn validate_key(&self, raw_key: &str) -> Result<ApiKey, ServiceError> {
        let lookup_hash = ApiKey::calculate_lookup_hash(raw_key);
        let key = self
            .keys
            .find_by_lookup_hash(&lookup_hash)
            .await?
            .ok_or(ServiceError::Unauthenticated("Invalid API key"))?;

        if !key.active_flag {
            tracing::warn!(key_id = %key.api_key_id, "Revoked API key presented");
            return Err(ServiceError::Unauthenticated("API key has been revoked"));
        }
        if !key.is_usable_at(self.clock.now()) {
            tracing::warn!(key_id = %key.api_key_id, "Expired API key presented");
            return Err(ServiceError::Unauthenticated("API key has expired"));
        }
        Ok(key)
    }

    /// Count one request against the key's rate window.
    pub async fn check_rate_limit(&self, key: &ApiKey) -> Result<LimitCheck, ServiceError> {
        let (limit, _) = self.effective_limits(key);
        let window = self
            .counters
            .increment(
                &Self::rate_counter_key(key.api_key_id),
                self.rate_window(),
                self.clock.now(),
            )
            .await?;
        Ok(LimitCheck {
            allowed: window.count <= u64::from(limit),
            limit,
            window,
        })
    }

    /// Count one request against the key's UTC calendar-day quota.
    pub async fn check_daily_quota(&self, key: &ApiKey) -> Result<LimitCheck, ServiceError> {
        let (_, limit) = self.effective_limits(key);
        let window = self
            .counters
            .increment(
                &Self::daily_counter_key(key.api_key_id),
                CounterWindow::CalendarDay,
                self.clock.now(),
            )
            .await?;
        Ok(LimitCheck {
            allowed: window.count <= u64::from(limit),
            limit,
            window,
        })
    }

    /// Validate, then rate, then quota. The first failing check decides.
    pub async fn admit(&self, raw_key: &str) -> Result<ApiKeyContext, ServiceError> {
        let key = match self.validate_key(raw_key).await {
            Ok(key) => key,
            Err(e) => {
                if matches!(e, ServiceError::Unauthenticated(_)) {
                    metrics::record_api_key_rejection("invalid_key");
                }
                return Err(e);
            }
        };

        let rate = self.check_rate_limit(&key).await?;
        if !rate.allowed {
            let retry_after_secs = rate.window.retry_after_secs(self.clock.now());
            tracing::warn!(
                key_id = %key.api_key_id,
                organization_id = %key.organization_id,
                limit = rate.limit,
                retry_after_secs,
                "API key rate limit exceeded"
            );
            metrics::record_api_key_rejection("rate_limit");
            return Err(ServiceError::RateLimitExceeded {
                limit: rate.limit,
                retry_after_secs,
            });
        }

        let quota = self.check_daily_quota(&key).await?;
        if !quota.allowed {
            let retry_after_secs = quota.window.retry_after_secs(self.clock.now());
            tracing::warn!(
                key_id = %key.api_key_id,
                organization_id = %key.organization_id,
                limit = quota.limit,
                retry_after_secs,
                "API key daily quota exceeded"
            );
            metrics::record_api_key_rejection("daily_quota");
            return Err(ServiceError::QuotaExceeded {
                limit: quota.limit,
                retry_after_secs,
            });
        }

        if let Err(e) = self
            .keys
            .touch_last_used(key.api_key_id, self.clock.now())
            .await
        {
            tracing::warn!(key_id = %key.api_key_id, error = %e, "Failed to record API key usage");
        }

        Ok(ApiKeyContext {
            key_id: key.api_key_id,
            organization_id: key.organization_id,
        })
    }

    /// Create a key. The raw value is returned here and nowhere else.
    pub async fn issue(
        &self,
        organization_id: Uuid,
        label: String,
        limits: ApiKeyLimits,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(String, ApiKey), ServiceError> {
        let now = self.clock.now();
        if expires_at.is_some_and(|expires| expires <= now) {
            return Err(ServiceError::Validation(
                "expires_at must be in the future".to_string(),
            ));
        }

        let raw_key = ApiKey::generate_raw_key();
        let key = ApiKey::new(organization_id, label, &raw_key, limits, expires_at, now);
        self.keys.insert_key(&key).await?;

        tracing::info!(
            key_id = %key.api_key_id,
            organization_id = %organization_id,
            prefix = %key.key_prefix,
            "API key issued"
        );
        Ok((raw_key, key))
    }

    /// Deactivate a key owned by `organization_id`. Keys of other
    /// organizations are reported as missing.
    pub async fn revoke(&self, organization_id: Uuid, key_id: Uuid) -> Result<(), ServiceError> {
        let owned = self
            .keys
            .find_by_id(key_id)
            .await?
            .is_some_and(|k| k.organization_id == organization_id);
        if !owned || !self.keys.deactivate_key(key_id, self.clock.now()).await? {
            return Err(ServiceError::ApiKeyNotFound);
        }
        tracing::info!(key_id = %key_id, organization_id = %organization_id, "API key revoked");
        Ok(())
    }

    /// Current counters for a key, read without counting.
    pub async fn usage(&self, key_id: Uuid) -> Result<ApiKeyUsage, ServiceError> {
        let key = self
            .keys
            .find_by_id(key_id)
            .await?
            .ok_or(ServiceError::ApiKeyNotFound)?;
        let (rate_limit, daily_quota) = self.effective_limits(&key);
        let now = self.clock.now();

        let rate = self
            .counters
            .peek(&Self::rate_counter_key(key_id), self.rate_window(), now)
            .await?;
        let daily = self
            .counters
            .peek(&Self::daily_counter_key(key_id), CounterWindow::CalendarDay, now)
            .await?;

        Ok(ApiKeyUsage {
            key_id,
            organization_id: key.organization_id,
            rate_window: WindowUsage {
                window_start: rate.window_start,
                used: rate.count,
                limit: rate_limit,
            },
            daily: WindowUsage {
                window_start: daily.window_start,
                used: daily.count,
                limit: daily_quota,
            },
        })
    }

    pub async fn list(&self, organization_id: Uuid) -> Result<Vec<ApiKeyResponse>, ServiceError> {
        let keys = self.keys.list_keys(organization_id).await?;
        Ok(keys.into_iter().map(ApiKeyResponse::from).collect())
    }

    pub async fn health_check(&self) -> Result<(), ServiceError> {
        self.keys.health_check().await?;
        self.counters.health_check().await
    }
}
