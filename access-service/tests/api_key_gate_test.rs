mod common;

use access_service::{
    config::QuotaConfig,
    models::{PermissionScope, Role},
};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use chrono::{Duration, TimeZone, Utc};
use common::{body_json, get, json_request, TestApp};
use serde_json::json;

fn usage_request(header_name: &str, key: &str) -> Request<Body> {
    Request::builder()
        .uri("/external/v1/usage")
        .header(header_name, key)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn missing_key_is_bad_request() {
    let app = TestApp::new();
    let response = app.send(get("/external/v1/usage", None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_key_is_unauthorized() {
    let app = TestApp::new();
    let response = app
        .send(usage_request("x-api-key", "ans_live_does-not-exist"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn valid_key_reports_its_usage_under_either_header() {
    let app = TestApp::new();
    let key = app.issue_key().await;

    let response = app.send(usage_request("x-api-key", &key)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["organization_id"], app.organization_id.to_string());
    assert_eq!(body["rate_window"]["used"], 1);
    assert_eq!(body["daily"]["used"], 1);

    let response = app.send(usage_request("x-apikey", &key)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["rate_window"]["used"], 2);
}

#[tokio::test]
async fn rate_limit_rejection_carries_code_and_retry_after() {
    let app = TestApp::with_quota(QuotaConfig {
        rate_limit_per_window: 2,
        rate_window_seconds: 60,
        daily_quota: 100,
    });
    let key = app.issue_key().await;

    for _ in 0..2 {
        let response = app.send(usage_request("x-api-key", &key)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.send(usage_request("x-api-key", &key)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "60");
    assert_eq!(body_json(response).await["code"], "RATE_LIMIT_EXCEEDED");

    app.clock.advance(Duration::seconds(60));
    let response = app.send(usage_request("x-api-key", &key)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn daily_quota_rejection_is_distinct_and_resets_at_midnight() {
    let app = TestApp::with_quota(QuotaConfig {
        rate_limit_per_window: 100,
        rate_window_seconds: 60,
        daily_quota: 2,
    });
    let key = app.issue_key().await;

    for _ in 0..2 {
        assert_eq!(
            app.send(usage_request("x-api-key", &key)).await.status(),
            StatusCode::OK
        );
        app.clock.advance(Duration::minutes(2));
    }

    let response = app.send(usage_request("x-api-key", &key)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(response.headers().get(header::RETRY_AFTER).is_some());
    assert_eq!(body_json(response).await["code"], "QUOTA_EXCEEDED");

    app.clock
        .set(Utc.with_ymd_and_hms(2026, 9, 2, 0, 0, 0).unwrap());
    assert_eq!(
        app.send(usage_request("x-api-key", &key)).await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn key_lifecycle_over_http() {
    let app = TestApp::new();
    let manager = app.add_user(Role::Instructor);
    app.grant(&manager, PermissionScope::ManageApiKeys).await;
    let auth = app.bearer(&manager);

    let response = app
        .send(json_request(
            "POST",
            "/api-keys",
            &auth,
            json!({ "label": "reporting export", "daily_quota": 500 }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let raw_key = body["api_key"].as_str().unwrap().to_string();
    let key_id = body["key"]["key_id"].as_str().unwrap().to_string();
    assert!(raw_key.starts_with("ans_live_"));
    assert_eq!(body["key"]["daily_quota"], 500);
    assert!(body["key"].get("lookup_hash").is_none());

    let response = app.send(get("/api-keys", Some(&auth))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

    assert_eq!(
        app.send(usage_request("x-api-key", &raw_key)).await.status(),
        StatusCode::OK
    );

    let revoke = Request::builder()
        .method("DELETE")
        .uri(format!("/api-keys/{}", key_id))
        .header("Authorization", &auth)
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(revoke).await.status(), StatusCode::NO_CONTENT);

    assert_eq!(
        app.send(usage_request("x-api-key", &raw_key)).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn key_management_requires_scope_and_valid_body() {
    let app = TestApp::new();
    let instructor = app.add_user(Role::Instructor);

    let response = app
        .send(get("/api-keys", Some(&app.bearer(&instructor))))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let admin = app.add_user(Role::Admin);
    let response = app
        .send(json_request(
            "POST",
            "/api-keys",
            &app.bearer(&admin),
            json!({ "label": "", "rate_limit_per_window": 0 }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_FAILED");
}
