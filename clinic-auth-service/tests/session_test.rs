//! Login, logout, refresh and token validation over HTTP.

mod common;

use axum::http::StatusCode;
use clinic_auth_service::repository::UserRepository;
use clinic_auth_service::services::cache::{presence_key, CacheStore, PresenceEntry};
use common::{access_token, refresh_token, user_id, TestApp, PASSWORD};
use serde_json::json;

#[tokio::test]
async fn test_login_returns_token_pair_and_marks_online() {
    let app = TestApp::spawn();
    let registered = app.register("a@x.com", "patient").await;
    let id = user_id(&registered);

    let body = app.login("A@x.com").await;

    assert_eq!(body["message"], "Login successful");
    assert_eq!(body["user"]["id"], registered["user"]["id"]);
    assert_eq!(body["user"]["is_online"], true);
    assert!(!access_token(&body).is_empty());
    assert!(!refresh_token(&body).is_empty());

    let cached = app.cache.get_cache(&presence_key(id)).await.unwrap().unwrap();
    let entry: PresenceEntry = serde_json::from_str(&cached).unwrap();
    assert!(entry.is_online);
}

#[tokio::test]
async fn test_wrong_password_and_unknown_email_look_the_same() {
    let app = TestApp::spawn();
    app.register("a@x.com", "patient").await;

    let wrong = app
        .post("/login", json!({ "email": "a@x.com", "password": "wrong-password" }), None)
        .await;
    let unknown = app
        .post("/login", json!({ "email": "b@x.com", "password": PASSWORD }), None)
        .await;

    for response in [wrong, unknown] {
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.body["error"], "Invalid email or password");
    }
}

#[tokio::test]
async fn test_deactivated_account_cannot_log_in_or_refresh() {
    let app = TestApp::spawn();
    let registered = app.register("a@x.com", "patient").await;
    let id = user_id(&registered);

    let response = app
        .admin_post(&format!("/admin/users/{}/deactivate", id), json!({}))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["user"]["is_active"], false);

    for password in [PASSWORD, "wrong-password"] {
        let login = app
            .post("/login", json!({ "email": "a@x.com", "password": password }), None)
            .await;
        assert_eq!(login.status, StatusCode::FORBIDDEN);
        assert_eq!(login.body["error"], "User account is deactivated");
    }

    // Deactivation revokes every refresh session.
    let refresh = app
        .post(
            "/token/refresh",
            json!({ "refresh_token": refresh_token(&registered) }),
            None,
        )
        .await;
    assert_eq!(refresh.status, StatusCode::UNAUTHORIZED);

    let profile = app.get("/profile", Some(&access_token(&registered))).await;
    assert_eq!(profile.status, StatusCode::FORBIDDEN);

    app.admin_post(&format!("/admin/users/{}/activate", id), json!({}))
        .await;
    app.login("a@x.com").await;
}

#[tokio::test]
async fn test_refresh_mints_new_access_token() {
    let app = TestApp::spawn();
    let registered = app.register("a@x.com", "patient").await;

    let response = app
        .post("/token/refresh", json!({ "refresh": refresh_token(&registered) }), None)
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let new_access = access_token(&response.body);
    assert_eq!(response.body["expires_in"], 900);
    assert_eq!(response.body["user"]["email"], "a@x.com");

    let profile = app.get("/profile", Some(&new_access)).await;
    assert_eq!(profile.status, StatusCode::OK);
    assert_eq!(profile.body["user"]["email"], "a@x.com");
}

#[tokio::test]
async fn test_access_token_is_not_a_refresh_token() {
    let app = TestApp::spawn();
    let registered = app.register("a@x.com", "patient").await;

    let response = app
        .post(
            "/token/refresh",
            json!({ "refresh_token": access_token(&registered) }),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_tokens_and_marks_offline() {
    let app = TestApp::spawn();
    let body = app.register_and_login("a@x.com").await;
    let access = access_token(&body);
    let refresh = refresh_token(&body);

    let response = app
        .post("/logout", json!({ "refresh_token": refresh }), Some(&access))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "Logged out successfully");

    let user = app.repo.find_user_by_id(user_id(&body)).await.unwrap().unwrap();
    assert!(!user.is_online);

    let profile = app.get("/profile", Some(&access)).await;
    assert_eq!(profile.status, StatusCode::UNAUTHORIZED);
    assert_eq!(profile.body["error"], "Token has been revoked");

    let refreshed = app
        .post("/token/refresh", json!({ "refresh_token": refresh }), None)
        .await;
    assert_eq!(refreshed.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_with_bad_refresh_token_still_goes_offline() {
    let app = TestApp::spawn();
    let body = app.register_and_login("a@x.com").await;

    let response = app
        .post(
            "/logout",
            json!({ "refresh_token": "not-a-token" }),
            Some(&access_token(&body)),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    let user = app.repo.find_user_by_id(user_id(&body)).await.unwrap().unwrap();
    assert!(!user.is_online);
}

#[tokio::test]
async fn test_logout_without_body_only_revokes_access_token() {
    let app = TestApp::spawn();
    let body = app.register_and_login("a@x.com").await;

    let response = app
        .send(
            axum::http::Method::POST,
            "/logout",
            None,
            &[("Authorization", &format!("Bearer {}", access_token(&body)))],
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let refreshed = app
        .post(
            "/token/refresh",
            json!({ "refresh_token": refresh_token(&body) }),
            None,
        )
        .await;
    assert_eq!(refreshed.status, StatusCode::OK);
}

#[tokio::test]
async fn test_validate_token_and_profile() {
    let app = TestApp::spawn();
    let body = app.register("a@x.com", "consultant").await;
    let access = access_token(&body);

    let validated = app.get("/token/validate", Some(&access)).await;
    assert_eq!(validated.status, StatusCode::OK);
    assert_eq!(validated.body["valid"], true);
    assert_eq!(validated.body["message"], "Token is valid");
    assert_eq!(validated.body["user"]["role"], "consultant");
    assert_eq!(validated.body["user"]["is_online"], true);

    let anonymous = app.get("/profile", None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let garbage = app.get("/token/validate", Some("garbage")).await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);
    assert_eq!(garbage.body["error"], "Invalid token");
}

#[tokio::test]
async fn test_blacklist_outage_fails_closed() {
    let app = TestApp::spawn();
    let body = app.register("a@x.com", "patient").await;
    app.cache.set_failing(true);

    let response = app.get("/profile", Some(&access_token(&body))).await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
}
