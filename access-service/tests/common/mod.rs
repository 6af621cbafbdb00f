//! Shared setup for access-service router tests: in-memory stores, a manual
//! clock and helpers for session and API key headers.

#![allow(dead_code)]

use access_service::{
    build_router,
    config::{
        AccessConfig, DatabaseConfig, Environment, QuotaConfig, RedisConfig, SecurityConfig,
        SessionConfig,
    },
    models::{PermissionScope, Role, User},
    services::{
        InMemoryApiKeyStore, InMemoryCounterStore, InMemoryGrantStore, InMemoryUserDirectory,
        ManualClock,
    },
    AppState, Backends,
};
use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const TEST_SESSION_SECRET: &str = "test-session-secret-0123456789abcdef";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub users: Arc<InMemoryUserDirectory>,
    pub clock: Arc<ManualClock>,
    pub organization_id: Uuid,
}

pub fn test_config(quota: QuotaConfig) -> AccessConfig {
    AccessConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "access-service".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://unused".to_string(),
            key_prefix: "test".to_string(),
        },
        session: SessionConfig {
            secret: TEST_SESSION_SECRET.to_string(),
            token_expiry_minutes: 30,
        },
        quota,
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_quota(QuotaConfig::default())
    }

    pub fn with_quota(quota: QuotaConfig) -> Self {
        let users = Arc::new(InMemoryUserDirectory::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).unwrap(),
        ));
        let backends = Backends {
            users: users.clone(),
            grants: Arc::new(InMemoryGrantStore::new()),
            keys: Arc::new(InMemoryApiKeyStore::new()),
            counters: Arc::new(InMemoryCounterStore::new()),
            clock: clock.clone(),
        };
        let state = AppState::new(test_config(quota), backends);
        let router = build_router(state.clone());

        Self {
            router,
            state,
            users,
            clock,
            organization_id: Uuid::new_v4(),
        }
    }

    /// Add a user to this app's organization.
    pub fn add_user(&self, role: Role) -> User {
        let user = User::new(
            format!("{}@answly.test", Uuid::new_v4()),
            role,
            Some(self.organization_id),
        );
        self.users.insert(user.clone());
        user
    }

    pub fn clock_now(&self) -> chrono::DateTime<Utc> {
        use access_service::services::Clock;
        self.clock.now()
    }

    pub fn bearer(&self, user: &User) -> String {
        let token = self.state.sessions.issue(user.user_id).unwrap();
        format!("Bearer {}", token)
    }

    /// Grant `scope` directly through the service, bypassing HTTP.
    pub async fn grant(&self, user: &User, scope: PermissionScope) {
        self.state
            .permissions
            .grant(user.user_id, self.organization_id, scope, user.user_id, None)
            .await
            .unwrap();
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Issue a key for this app's organization and return the raw value.
    pub async fn issue_key(&self) -> String {
        let (raw, _) = self
            .state
            .api_keys
            .issue(
                self.organization_id,
                "test".to_string(),
                Default::default(),
                None,
            )
            .await
            .unwrap();
        raw
    }
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub fn get(uri: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(auth) = auth {
        builder = builder.header("Authorization", auth);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(method: &str, uri: &str, auth: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", auth)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn assert_status(response: &Response<Body>, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status for response");
}
