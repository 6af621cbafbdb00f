pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch},
    Json, Router,
};
use service_core::middleware::{metrics_middleware, request_id_middleware, REQUEST_ID_HEADER};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::config::AccessConfig;
use crate::middleware::{
    api_key_middleware, require_permission, require_role, session_auth_middleware,
    PermissionGuard, RoleGuard, ORGANIZATION_HEADER,
};
use crate::models::{PermissionScope, Role};
use crate::services::{
    ApiKeyGate, ApiKeyStore, Clock, CounterStore, GrantStore, PermissionService, SessionTokens,
    UserDirectory,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::permissions::check_permission,
        handlers::permissions::list_permissions,
        handlers::permissions::create_permission,
        handlers::permissions::revoke_permission,
        handlers::permissions::purge_permissions,
        handlers::users::set_role,
        handlers::api_keys::list_api_keys,
        handlers::api_keys::create_api_key,
        handlers::api_keys::revoke_api_key,
        handlers::external::usage,
    ),
    components(
        schemas(
            models::PermissionScope,
            models::Role,
            models::CheckPermissionResponse,
            models::CreateGrantRequest,
            models::GrantResponse,
            models::PurgeGrantsResponse,
            models::SetRoleRequest,
            models::UserResponse,
            models::CreateApiKeyRequest,
            models::CreateApiKeyResponse,
            models::ApiKeyResponse,
            models::ApiKeyUsage,
            models::WindowUsage,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Permissions", description = "Scoped permission checks and grants"),
        (name = "Users", description = "Role administration"),
        (name = "API Keys", description = "Machine credential lifecycle"),
        (name = "External", description = "Endpoints behind the API key gate"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("x-api-key"))),
            );
        }
    }
}

/// Storage and time source the services run on.
#[derive(Clone)]
pub struct Backends {
    pub users: Arc<dyn UserDirectory>,
    pub grants: Arc<dyn GrantStore>,
    pub keys: Arc<dyn ApiKeyStore>,
    pub counters: Arc<dyn CounterStore>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AccessConfig>,
    pub permissions: PermissionService,
    pub api_keys: ApiKeyGate,
    pub sessions: SessionTokens,
}

impl AppState {
    pub fn new(config: AccessConfig, backends: Backends) -> Self {
        let permissions = PermissionService::new(
            backends.users,
            backends.grants,
            backends.clock.clone(),
        );
        let api_keys = ApiKeyGate::new(
            backends.keys,
            backends.counters,
            backends.clock,
            config.quota.gate_defaults(),
        );
        let sessions = SessionTokens::new(&config.session);

        Self {
            config: Arc::new(config),
            permissions,
            api_keys,
            sessions,
        }
    }
}

/// Session plus a scope check, in that order.
fn with_scope(router: Router<AppState>, state: &AppState, scope: PermissionScope) -> Router<AppState> {
    router
        .route_layer(from_fn_with_state(
            PermissionGuard::new(state.permissions.clone(), scope),
            require_permission,
        ))
        .route_layer(from_fn_with_state(state.clone(), session_auth_middleware))
}

fn with_role(router: Router<AppState>, state: &AppState, roles: &[Role]) -> Router<AppState> {
    router
        .route_layer(from_fn_with_state(RoleGuard::new(roles.to_vec()), require_role))
        .route_layer(from_fn_with_state(state.clone(), session_auth_middleware))
}

pub fn build_router(state: AppState) -> Router {
    let permission_admin = with_scope(
        Router::new()
            .route(
                "/permissions",
                get(handlers::permissions::list_permissions)
                    .post(handlers::permissions::create_permission),
            )
            .route(
                "/permissions/:user_id/:scope",
                delete(handlers::permissions::revoke_permission),
            ),
        &state,
        PermissionScope::ManagePermissions,
    );

    let admin_only = with_role(
        Router::new()
            .route("/permissions", delete(handlers::permissions::purge_permissions))
            .route("/users/:user_id/role", patch(handlers::users::set_role)),
        &state,
        &[Role::Admin],
    );

    let key_management = with_scope(
        Router::new()
            .route(
                "/api-keys",
                get(handlers::api_keys::list_api_keys).post(handlers::api_keys::create_api_key),
            )
            .route("/api-keys/:key_id", delete(handlers::api_keys::revoke_api_key)),
        &state,
        PermissionScope::ManageApiKeys,
    );

    let session_only = Router::new()
        .route("/permissions/check", get(handlers::permissions::check_permission))
        .route_layer(from_fn_with_state(state.clone(), session_auth_middleware));

    let external = Router::new()
        .route("/external/v1/usage", get(handlers::external::usage))
        .route_layer(from_fn_with_state(state.clone(), api_key_middleware));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::health::metrics))
        .route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .merge(session_only)
        .merge(permission_admin)
        .merge(admin_only)
        .merge(key_management)
        .merge(external)
        .with_state(state.clone())
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(cors_layer(&state.config.security.allowed_origins))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-api-key"),
            HeaderName::from_static("x-apikey"),
            HeaderName::from_static(ORGANIZATION_HEADER),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}
