use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

use crate::services::GateDefaults;

#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub session: SessionConfig,
    pub quota: QuotaConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    /// Namespace for counter keys so several deployments can share a server.
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    pub token_expiry_minutes: i64,
}

/// Defaults for keys that carry no ceiling of their own.
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    pub rate_limit_per_window: u32,
    pub rate_window_seconds: u64,
    pub daily_quota: u32,
}

impl QuotaConfig {
    pub fn gate_defaults(&self) -> GateDefaults {
        GateDefaults {
            rate_limit_per_window: self.rate_limit_per_window,
            rate_window: chrono::Duration::seconds(
                i64::try_from(self.rate_window_seconds).unwrap_or(i64::MAX / 1000),
            ),
            daily_quota: self.daily_quota,
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_window: 60,
            rate_window_seconds: 60,
            daily_quota: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

impl AccessConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let environment: Environment = get_env("ENVIRONMENT", Some("dev"), false)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        let config = AccessConfig {
            common,
            environment,
            service_name: get_env("SERVICE_NAME", Some("access-service"), false)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", false)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", false)?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", None, is_prod)?,
                key_prefix: get_env("REDIS_KEY_PREFIX", Some("access"), false)?,
            },
            session: SessionConfig {
                secret: get_env("SESSION_SECRET", None, is_prod)?,
                token_expiry_minutes: parse_env("SESSION_TOKEN_EXPIRY_MINUTES", "60", false)?,
            },
            quota: QuotaConfig {
                rate_limit_per_window: parse_env("API_KEY_RATE_LIMIT", "60", false)?,
                rate_window_seconds: parse_env("API_KEY_RATE_WINDOW_SECONDS", "60", false)?,
                daily_quota: parse_env("API_KEY_DAILY_QUOTA", "10000", false)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(config_error("PORT must be greater than 0"));
        }
        if self.session.token_expiry_minutes <= 0 {
            return Err(config_error("SESSION_TOKEN_EXPIRY_MINUTES must be positive"));
        }
        if self.quota.rate_limit_per_window == 0 || self.quota.daily_quota == 0 {
            return Err(config_error("API key rate limit and daily quota must be positive"));
        }
        if self.quota.rate_window_seconds == 0 {
            return Err(config_error("API_KEY_RATE_WINDOW_SECONDS must be positive"));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(config_error(
                "DATABASE_MIN_CONNECTIONS cannot exceed DATABASE_MAX_CONNECTIONS",
            ));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(config_error("Wildcard CORS origin not allowed in production"));
            }
            if self.session.secret.len() < 32 {
                return Err(config_error("SESSION_SECRET must be at least 32 bytes in production"));
            }
        }

        Ok(())
    }
}

fn config_error(message: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(message.to_string()))
}

fn get_env(key: &str, default: Option<&str>, required: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => match default {
            Some(def) if !required => Ok(def.to_string()),
            _ => Err(AppError::ConfigError(anyhow::anyhow!(
                "{} is required but not set",
                key
            ))),
        },
    }
}

fn parse_env<T>(key: &str, default: &str, required: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), required)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("Invalid {}: {}", key, e)))
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
