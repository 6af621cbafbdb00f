use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::{aio::ConnectionManager, Client, Script};

use crate::services::counter::{CounterStore, CounterWindow, WindowedCount};
use crate::services::ServiceError;

// INCR and set the expiry on the first hit in one round trip, then report the
// remaining lifetime so the caller can recover the window start.
const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
return {count, ttl}
"#;

/// Counter store shared by every replica of the service.
#[derive(Clone)]
pub struct RedisCounterStore {
    _client: Client,
    manager: ConnectionManager,
    script: Script,
    key_prefix: String,
}

impl RedisCounterStore {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %config.url, "Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
            script: Script::new(INCREMENT_SCRIPT),
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// Redis key and the lifetime a freshly created window gets.
    fn window_key(&self, key: &str, window: CounterWindow, now: DateTime<Utc>) -> (String, i64) {
        match window {
            CounterWindow::Rolling(length) => (
                format!("{}:{}:rolling", self.key_prefix, key),
                length.num_milliseconds().max(1),
            ),
            CounterWindow::CalendarDay => {
                let start = window.start_at(now);
                let ttl = (window.end_of(start) - now).num_milliseconds().max(1);
                (
                    format!("{}:{}:day:{}", self.key_prefix, key, start.format("%Y%m%d")),
                    ttl,
                )
            }
        }
    }

    fn window_start(window: CounterWindow, now: DateTime<Utc>, ttl_ms: i64) -> DateTime<Utc> {
        match window {
            CounterWindow::Rolling(length) if ttl_ms > 0 => {
                now - (length - Duration::milliseconds(ttl_ms.min(length.num_milliseconds())))
            }
            _ => window.start_at(now),
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(
        &self,
        key: &str,
        window: CounterWindow,
        now: DateTime<Utc>,
    ) -> Result<WindowedCount, ServiceError> {
        let mut conn = self.manager.clone();
        let (redis_key, ttl_ms) = self.window_key(key, window, now);

        let (count, remaining_ms): (u64, i64) = self
            .script
            .key(&redis_key)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await?;

        Ok(WindowedCount::new(
            window,
            Self::window_start(window, now, remaining_ms),
            count,
        ))
    }

    async fn peek(
        &self,
        key: &str,
        window: CounterWindow,
        now: DateTime<Utc>,
    ) -> Result<WindowedCount, ServiceError> {
        let mut conn = self.manager.clone();
        let (redis_key, _) = self.window_key(key, window, now);

        let (count, remaining_ms): (Option<u64>, i64) = redis::pipe()
            .get(&redis_key)
            .pttl(&redis_key)
            .query_async(&mut conn)
            .await?;

        Ok(match count {
            Some(count) => {
                WindowedCount::new(window, Self::window_start(window, now, remaining_ms), count)
            }
            None => WindowedCount::new(window, window.start_at(now), 0),
        })
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| {
                tracing::error!("Redis health check failed: {}", e);
                ServiceError::Redis(e)
            })?;
        Ok(())
    }
}
