//! Registration over HTTP: account, profile, verification token and session.

mod common;

use axum::http::StatusCode;
use clinic_auth_service::repository::ProfileRepository;
use common::{access_token, refresh_token, user_id, TestApp, PASSWORD};
use serde_json::json;

#[tokio::test]
async fn test_register_patient_creates_user_profile_and_token() {
    let app = TestApp::spawn();

    let body = app.register("a@x.com", "patient").await;

    assert_eq!(
        body["message"],
        "User registered successfully. Please check your email to verify your account"
    );
    assert_eq!(body["user"]["email"], "a@x.com");
    assert_eq!(body["user"]["role"], "patient");
    assert_eq!(body["user"]["is_verified"], false);
    assert_eq!(body["user"]["is_online"], true);
    assert_eq!(body["user"]["full_name"], "Jane Doe");
    assert!(body["user"].get("password_hash").is_none());
    assert!(!access_token(&body).is_empty());
    assert!(!refresh_token(&body).is_empty());
    assert_eq!(body["expires_in"], 900);

    let id = user_id(&body);
    assert!(app.repo.find_patient_profile(id).await.unwrap().is_some());
    assert!(app.repo.find_consultant_profile_by_user(id).await.unwrap().is_none());

    let tokens = app.verification_tokens(id).await;
    assert_eq!(tokens.len(), 1);
    assert!(!tokens[0].is_used);

    let sent = app.notifier.sent_to("a@x.com");
    assert_eq!(sent.len(), 1);
    assert!(sent[0]
        .verification_url
        .ends_with(&format!("/verify-email?token={}", tokens[0].token)));
}

#[tokio::test]
async fn test_register_consultant_provisions_consultant_profile() {
    let app = TestApp::spawn();

    let body = app.register("doc@x.com", "consultant").await;
    let id = user_id(&body);

    let profile = app.repo.find_consultant_profile_by_user(id).await.unwrap();
    assert!(profile.is_some());
    assert!(app.repo.find_patient_profile(id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_role_defaults_to_patient() {
    let app = TestApp::spawn();

    let response = app
        .post(
            "/register",
            json!({
                "email": "b@x.com",
                "password": PASSWORD,
                "confirm_password": PASSWORD,
                "first_name": "Ben",
                "last_name": "Doe",
            }),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["user"]["role"], "patient");
}

#[tokio::test]
async fn test_duplicate_email_is_conflict() {
    let app = TestApp::spawn();
    app.register("a@x.com", "patient").await;

    let response = app
        .post(
            "/register",
            json!({
                "email": "A@X.com",
                "password": PASSWORD,
                "password_confirm": PASSWORD,
                "first_name": "Jane",
                "last_name": "Doe",
            }),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.body["error"], "User with this email already exists");
}

#[tokio::test]
async fn test_password_mismatch_is_rejected_without_side_effects() {
    let app = TestApp::spawn();

    let response = app
        .post(
            "/register",
            json!({
                "email": "a@x.com",
                "password": PASSWORD,
                "password_confirm": "different123",
                "first_name": "Jane",
                "last_name": "Doe",
            }),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "Passwords do not match");
    assert!(app.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_short_password_fails_validation() {
    let app = TestApp::spawn();

    let response = app
        .post(
            "/register",
            json!({
                "email": "a@x.com",
                "password": "short",
                "password_confirm": "short",
                "first_name": "Jane",
                "last_name": "Doe",
            }),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_admin_role_cannot_self_register() {
    let app = TestApp::spawn();

    let response = app
        .post(
            "/register",
            json!({
                "email": "root@x.com",
                "password": PASSWORD,
                "password_confirm": PASSWORD,
                "first_name": "Root",
                "last_name": "User",
                "role": "admin",
            }),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_email_failure_does_not_fail_registration() {
    let app = TestApp::spawn();
    app.notifier.set_failing(true);

    let body = app.register("a@x.com", "patient").await;

    assert!(app.notifier.sent().is_empty());
    assert_eq!(app.verification_tokens(user_id(&body)).await.len(), 1);
}
