//! Registration flow: dual-write saga, duplicate handling, and the role
//! gate on the password login path.

mod common;

use axum::http::StatusCode;
use common::{str_field, TestApp};

#[tokio::test]
async fn register_then_login_round_trip() {
    let app = TestApp::spawn();

    let body = app.register("jane@example.com", "password123", "Jane Doe").await;
    assert_eq!(str_field(&body, "/user/email"), "jane@example.com");
    assert_eq!(str_field(&body, "/user/role"), "stakeholder");
    assert!(!str_field(&body, "/tokens/access_token").is_empty());
    assert!(!str_field(&body, "/tokens/refresh_token").is_empty());
    assert_eq!(str_field(&body, "/tokens/token_type"), "Bearer");

    // Exactly one row in each system, linked by uid.
    assert_eq!(app.store.user_count(), 1);
    assert_eq!(app.provider.account_count(), 1);
    let uid = str_field(&body, "/user/provider_uid");
    assert!(app.provider.has_account(uid));

    let (status, body) = app
        .post_json(
            "/api/v1/auth/login",
            serde_json::json!({ "email": "jane@example.com", "password": "password123" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(str_field(&body, "/user/email"), "jane@example.com");
}

#[tokio::test]
async fn email_is_canonicalized_to_lowercase() {
    let app = TestApp::spawn();

    let body = app.register("Jane@Example.COM", "password123", "Jane Doe").await;
    assert_eq!(str_field(&body, "/user/email"), "jane@example.com");

    // The mixed-case spelling authenticates against the same account.
    let (status, _) = app
        .post_json(
            "/api/v1/auth/login",
            serde_json::json!({ "email": "JANE@example.com", "password": "password123" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.store.user_count(), 1);
}

#[tokio::test]
async fn duplicate_email_conflicts_without_second_account() {
    let app = TestApp::spawn();
    app.register("jane@example.com", "password123", "Jane Doe").await;

    let (status, _) = app
        .post_json(
            "/api/v1/auth/register",
            serde_json::json!({
                "email": "jane@example.com",
                "password": "different456",
                "name": "Impostor",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Neither system picked up a second identity.
    assert_eq!(app.store.user_count(), 1);
    assert_eq!(app.provider.account_count(), 1);
}

#[tokio::test]
async fn provider_duplicate_maps_to_conflict() {
    let app = TestApp::spawn();
    app.provider.fail_next_create_with_duplicate();

    let (status, _) = app
        .post_json(
            "/api/v1/auth/register",
            serde_json::json!({
                "email": "jane@example.com",
                "password": "password123",
                "name": "Jane Doe",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.store.user_count(), 0);
}

#[tokio::test]
async fn provider_failure_leaves_no_local_row() {
    let app = TestApp::spawn();
    app.provider.fail_next_create();

    let (status, _) = app
        .post_json(
            "/api/v1/auth/register",
            serde_json::json!({
                "email": "jane@example.com",
                "password": "password123",
                "name": "Jane Doe",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.store.user_count(), 0);
    assert_eq!(app.provider.account_count(), 0);
}

#[tokio::test]
async fn local_insert_failure_compensates_provider_account() {
    let app = TestApp::spawn();
    app.store.fail_next_user_inserts(1);

    let (status, _) = app
        .post_json(
            "/api/v1/auth/register",
            serde_json::json!({
                "email": "jane@example.com",
                "password": "password123",
                "name": "Jane Doe",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    // The compensating delete removed the just-created provider account.
    assert_eq!(app.provider.account_count(), 0);
    assert_eq!(app.store.user_count(), 0);

    // A retry with the same email now succeeds cleanly.
    app.register("jane@example.com", "password123", "Jane Doe").await;
    assert_eq!(app.store.user_count(), 1);
    assert_eq!(app.provider.account_count(), 1);
}

#[tokio::test]
async fn failed_compensation_still_reports_registration_failure() {
    let app = TestApp::spawn();
    app.store.fail_next_user_inserts(1);
    app.provider.fail_deletes(true);

    let (status, _) = app
        .post_json(
            "/api/v1/auth/register",
            serde_json::json!({
                "email": "jane@example.com",
                "password": "password123",
                "name": "Jane Doe",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.store.user_count(), 0);

    // The orphaned provider account is logged, not retried.
    assert_eq!(app.provider.account_count(), 1);
}

#[tokio::test]
async fn base_role_account_cannot_use_password_login() {
    let app = TestApp::spawn();

    let (status, body) = app
        .post_json(
            "/api/v1/auth/register",
            serde_json::json!({
                "email": "casey@example.com",
                "password": "password123",
                "name": "Casey Citizen",
                "role": "citizen",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(str_field(&body, "/user/role"), "citizen");

    // The password is correct, but the role gate rejects the path.
    let (status, _) = app
        .post_json(
            "/api/v1/auth/login",
            serde_json::json!({ "email": "casey@example.com", "password": "password123" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The federated path still works for the same account.
    let uid = str_field(&body, "/user/provider_uid").to_string();
    let assertion = app.provider.issue_assertion(&uid);
    let (status, body) = app
        .post_json(
            "/api/v1/auth/login/federated",
            serde_json::json!({ "assertion": assertion }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(str_field(&body, "/user/email"), "casey@example.com");
    assert_eq!(app.store.user_count(), 1);
}

#[tokio::test]
async fn wrong_password_and_unknown_email_are_indistinguishable() {
    let app = TestApp::spawn();
    app.register("jane@example.com", "password123", "Jane Doe").await;

    let (wrong_status, wrong_body) = app
        .post_json(
            "/api/v1/auth/login",
            serde_json::json!({ "email": "jane@example.com", "password": "nope-nope" }),
        )
        .await;
    let (unknown_status, unknown_body) = app
        .post_json(
            "/api/v1/auth/login",
            serde_json::json!({ "email": "nobody@example.com", "password": "nope-nope" }),
        )
        .await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body, unknown_body);
}

#[tokio::test]
async fn malformed_registration_is_rejected() {
    let app = TestApp::spawn();

    let (status, _) = app
        .post_json(
            "/api/v1/auth/register",
            serde_json::json!({
                "email": "not-an-email",
                "password": "password123",
                "name": "Jane Doe",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app
        .post_json(
            "/api/v1/auth/register",
            serde_json::json!({
                "email": "jane@example.com",
                "password": "short",
                "name": "Jane Doe",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    assert_eq!(app.store.user_count(), 0);
    assert_eq!(app.provider.account_count(), 0);
}
