//! Session lifecycle: refresh-token rotation, logout semantics, and
//! access-token resolution against live account state.

mod common;

use axum::http::StatusCode;
use common::{str_field, TestApp};

#[tokio::test]
async fn refresh_rotates_the_pair_on_the_same_session_row() {
    let app = TestApp::spawn();
    let body = app.register("jane@example.com", "password123", "Jane Doe").await;
    let refresh_token = str_field(&body, "/tokens/refresh_token").to_string();

    assert_eq!(app.store.session_count(), 1);

    let (status, body) = app
        .post_json(
            "/api/v1/auth/refresh",
            serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let rotated = str_field(&body, "/tokens/refresh_token");
    assert_ne!(rotated, refresh_token);
    assert_eq!(str_field(&body, "/user/email"), "jane@example.com");

    // Rotation rewrites the existing row, it never mints a second session.
    assert_eq!(app.store.session_count(), 1);
}

#[tokio::test]
async fn refresh_token_is_single_use() {
    let app = TestApp::spawn();
    let body = app.register("jane@example.com", "password123", "Jane Doe").await;
    let first = str_field(&body, "/tokens/refresh_token").to_string();

    let (status, body) = app
        .post_json(
            "/api/v1/auth/refresh",
            serde_json::json!({ "refresh_token": first }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let second = str_field(&body, "/tokens/refresh_token").to_string();

    // The consumed value is gone for good.
    let (status, _) = app
        .post_json(
            "/api/v1/auth/refresh",
            serde_json::json!({ "refresh_token": first }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The freshly issued one still works.
    let (status, _) = app
        .post_json(
            "/api/v1/auth/refresh",
            serde_json::json!({ "refresh_token": second }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_refresh_token_is_rejected() {
    let app = TestApp::spawn();

    let (status, _) = app
        .post_json(
            "/api/v1/auth/refresh",
            serde_json::json!({ "refresh_token": "deadbeef".repeat(8) }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn access_token_grants_profile_access() {
    let app = TestApp::spawn();
    let body = app.register("jane@example.com", "password123", "Jane Doe").await;
    let access_token = str_field(&body, "/tokens/access_token").to_string();

    let (status, body) = app.get_authed("/api/v1/auth/profile", &access_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(str_field(&body, "/user/email"), "jane@example.com");
    assert!(body.pointer("/user/password_hash").is_none());
}

#[tokio::test]
async fn garbage_and_missing_bearer_tokens_are_rejected() {
    let app = TestApp::spawn();
    app.register("jane@example.com", "password123", "Jane Doe").await;

    let (status, _) = app.get_authed("/api/v1/auth/profile", "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/api/v1/auth/profile")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_is_client_side_only() {
    let app = TestApp::spawn();
    let body = app.register("jane@example.com", "password123", "Jane Doe").await;
    let access_token = str_field(&body, "/tokens/access_token").to_string();
    let refresh_token = str_field(&body, "/tokens/refresh_token").to_string();

    let (status, _) = app.post_authed("/api/v1/auth/logout", &access_token).await;
    assert_eq!(status, StatusCode::OK);

    // Nothing was revoked server-side: both tokens remain usable.
    let (status, _) = app.get_authed("/api/v1/auth/profile", &access_token).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post_json(
            "/api/v1/auth/refresh",
            serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn logout_all_invalidates_every_outstanding_access_token() {
    let app = TestApp::spawn();
    let body = app.register("jane@example.com", "password123", "Jane Doe").await;
    let first_token = str_field(&body, "/tokens/access_token").to_string();

    // A second device logs in.
    let (status, body) = app
        .post_json(
            "/api/v1/auth/login",
            serde_json::json!({ "email": "jane@example.com", "password": "password123" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let second_token = str_field(&body, "/tokens/access_token").to_string();

    let (status, _) = app
        .post_authed("/api/v1/auth/logout-all", &second_token)
        .await;
    assert_eq!(status, StatusCode::OK);

    // Every token issued before the bump fails claim resolution.
    let (status, _) = app.get_authed("/api/v1/auth/profile", &first_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.get_authed("/api/v1/auth/profile", &second_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A fresh login captures the new version and works again.
    let (status, body) = app
        .post_json(
            "/api/v1/auth/login",
            serde_json::json!({ "email": "jane@example.com", "password": "password123" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let fresh_token = str_field(&body, "/tokens/access_token").to_string();

    let (status, _) = app.get_authed("/api/v1/auth/profile", &fresh_token).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn refresh_recovers_access_after_logout_all() {
    let app = TestApp::spawn();
    let body = app.register("jane@example.com", "password123", "Jane Doe").await;
    let access_token = str_field(&body, "/tokens/access_token").to_string();
    let refresh_token = str_field(&body, "/tokens/refresh_token").to_string();

    let (status, _) = app
        .post_authed("/api/v1/auth/logout-all", &access_token)
        .await;
    assert_eq!(status, StatusCode::OK);

    // Refresh still works (sessions are untouched) and its new access token
    // carries the bumped version.
    let (status, body) = app
        .post_json(
            "/api/v1/auth/refresh",
            serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let new_access = str_field(&body, "/tokens/access_token").to_string();

    let (status, _) = app.get_authed("/api/v1/auth/profile", &new_access).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn profile_update_round_trips_and_mirrors_to_provider() {
    let app = TestApp::spawn();
    let body = app.register("jane@example.com", "password123", "Jane Doe").await;
    let access_token = str_field(&body, "/tokens/access_token").to_string();

    let (status, body) = app
        .put_json_authed(
            "/api/v1/auth/profile",
            &access_token,
            serde_json::json!({ "name": "Jane Q. Doe", "phone": "+15551234" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(str_field(&body, "/user/name"), "Jane Q. Doe");
    assert_eq!(str_field(&body, "/user/phone"), "+15551234");

    let (status, body) = app.get_authed("/api/v1/auth/profile", &access_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(str_field(&body, "/user/name"), "Jane Q. Doe");
}
