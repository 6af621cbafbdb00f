mod common;

use access_service::models::{PermissionScope, Role};
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Duration;
use common::{body_json, get, json_request, TestApp};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn check_requires_a_session() {
    let app = TestApp::new();
    let response = app
        .send(get("/permissions/check?scope=VIEW_REPORTS", None))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(get(
            "/permissions/check?scope=VIEW_REPORTS",
            Some("Bearer not-a-token"),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_passes_every_check() {
    let app = TestApp::new();
    let admin = app.add_user(Role::Admin);

    let response = app
        .send(get(
            "/permissions/check?scope=MANAGE_BILLING",
            Some(&app.bearer(&admin)),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["allowed"], true);
    assert_eq!(body["scope"], "MANAGE_BILLING");
}

#[tokio::test]
async fn grant_check_revoke_round() {
    let app = TestApp::new();
    let manager = app.add_user(Role::Instructor);
    app.grant(&manager, PermissionScope::ManagePermissions).await;
    let reviewer = app.add_user(Role::Reviewer);
    let manager_auth = app.bearer(&manager);
    let reviewer_auth = app.bearer(&reviewer);

    let response = app
        .send(get(
            "/permissions/check?scope=GRADE_SUBMISSIONS",
            Some(&reviewer_auth),
        ))
        .await;
    assert_eq!(body_json(response).await["allowed"], false);

    let response = app
        .send(json_request(
            "POST",
            "/permissions",
            &manager_auth,
            json!({ "user_id": reviewer.user_id, "scope": "GRADE_SUBMISSIONS" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["granted_by"], manager.user_id.to_string());
    assert_eq!(body["active"], true);

    let response = app
        .send(get(
            "/permissions/check?scope=GRADE_SUBMISSIONS",
            Some(&reviewer_auth),
        ))
        .await;
    assert_eq!(body_json(response).await["allowed"], true);

    let response = app
        .send(json_request(
            "POST",
            "/permissions",
            &manager_auth,
            json!({ "user_id": reviewer.user_id, "scope": "GRADE_SUBMISSIONS" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let uri = format!("/permissions/{}/GRADE_SUBMISSIONS", reviewer.user_id);
    let revoke = || {
        Request::builder()
            .method("DELETE")
            .uri(&uri)
            .header("Authorization", &manager_auth)
            .body(Body::empty())
            .unwrap()
    };
    assert_eq!(app.send(revoke()).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.send(revoke()).await.status(), StatusCode::NOT_FOUND);

    let response = app
        .send(get(
            "/permissions/check?scope=GRADE_SUBMISSIONS",
            Some(&reviewer_auth),
        ))
        .await;
    assert_eq!(body_json(response).await["allowed"], false);
}

#[tokio::test]
async fn managing_grants_needs_manage_permissions() {
    let app = TestApp::new();
    let instructor = app.add_user(Role::Instructor);
    let other = app.add_user(Role::TestTaker);

    let response = app
        .send(json_request(
            "POST",
            "/permissions",
            &app.bearer(&instructor),
            json!({ "user_id": other.user_id, "scope": "VIEW_REPORTS" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .send(get(
            &format!("/permissions/check?scope=VIEW_REPORTS&user_id={}", other.user_id),
            Some(&app.bearer(&instructor)),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn expired_grant_stops_allowing() {
    let app = TestApp::new();
    let user = app.add_user(Role::Instructor);
    let expires = app.clock_now() + Duration::minutes(10);
    app.state
        .permissions
        .grant(
            user.user_id,
            app.organization_id,
            PermissionScope::ExportData,
            user.user_id,
            Some(expires),
        )
        .await
        .unwrap();
    let auth = app.bearer(&user);

    let response = app
        .send(get("/permissions/check?scope=EXPORT_DATA", Some(&auth)))
        .await;
    assert_eq!(body_json(response).await["allowed"], true);

    app.clock.set(expires);
    let response = app
        .send(get("/permissions/check?scope=EXPORT_DATA", Some(&auth)))
        .await;
    assert_eq!(body_json(response).await["allowed"], false);
}

#[tokio::test]
async fn invalid_grant_requests_are_bad_requests() {
    let app = TestApp::new();
    let admin = app.add_user(Role::Admin);
    let auth = app.bearer(&admin);

    let response = app
        .send(json_request(
            "POST",
            "/permissions",
            &auth,
            json!({ "user_id": admin.user_id, "scope": "FLY_PLANES" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let past = app.clock_now() - Duration::hours(1);
    let response = app
        .send(json_request(
            "POST",
            "/permissions",
            &auth,
            json!({ "user_id": admin.user_id, "scope": "VIEW_REPORTS", "expires_at": past }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send(json_request(
            "POST",
            "/permissions",
            &auth,
            json!({ "user_id": Uuid::new_v4(), "scope": "VIEW_REPORTS" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn user_without_organization_must_name_one() {
    let app = TestApp::new();
    let admin = app.add_user(Role::Admin);
    let floating = access_service::models::User::new(
        "floating@answly.test".to_string(),
        Role::Instructor,
        None,
    );
    app.users.insert(floating.clone());

    let response = app
        .send(get("/permissions/check?scope=VIEW_REPORTS", Some(&app.bearer(&floating))))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send(
            Request::builder()
                .uri("/permissions/check?scope=VIEW_REPORTS")
                .header("Authorization", app.bearer(&admin))
                .header("x-organization-id", Uuid::new_v4().to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn purge_and_role_changes_are_admin_only() {
    let app = TestApp::new();
    let admin = app.add_user(Role::Admin);
    let manager = app.add_user(Role::Instructor);
    app.grant(&manager, PermissionScope::ManagePermissions).await;
    app.grant(&manager, PermissionScope::ViewReports).await;

    let purge = |auth: String| {
        Request::builder()
            .method("DELETE")
            .uri("/permissions")
            .header("Authorization", auth)
            .body(Body::empty())
            .unwrap()
    };
    assert_eq!(
        app.send(purge(app.bearer(&manager))).await.status(),
        StatusCode::FORBIDDEN
    );

    let response = app.send(purge(app.bearer(&admin))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["removed"], 2);

    let uri = format!("/users/{}/role", manager.user_id);
    let response = app
        .send(json_request("PATCH", &uri, &app.bearer(&manager), json!({ "role": "ADMIN" })))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .send(json_request("PATCH", &uri, &app.bearer(&admin), json!({ "role": "REVIEWER" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["role"], "REVIEWER");
}

#[tokio::test]
async fn listing_grants_reports_activity() {
    let app = TestApp::new();
    let admin = app.add_user(Role::Admin);
    let user = app.add_user(Role::TestTaker);
    app.grant(&user, PermissionScope::ViewReports).await;

    let response = app
        .send(get(
            &format!("/permissions?user_id={}", user.user_id),
            Some(&app.bearer(&admin)),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let grants = body.as_array().unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0]["scope"], "VIEW_REPORTS");
    assert_eq!(grants[0]["active"], true);
}
