//! Shared setup for the HTTP integration tests: the real router over the
//! in-memory repository, mock cache and mock notifier.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request, StatusCode},
    Router,
};
use clinic_auth_service::{
    build_router,
    config::{
        AuthConfig, DatabaseConfig, Environment, JwtConfig, RateLimitConfig, RedisConfig,
        SecurityConfig, SmtpConfig, SwaggerConfig, VerificationConfig,
    },
    repository::{InMemoryRepository, VerificationTokenRepository},
    services::{JwtService, MockCache, MockNotifier},
    utils::Argon2Hasher,
    AppState, Backends,
};
use serde_json::{json, Value};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const TEST_ADMIN_API_KEY: &str = "test-admin-key-12345";
pub const PASSWORD: &str = "pw12345678";

const TEST_PRIVATE_KEY: &str = include_str!("../fixtures/jwt_private.pem");
const TEST_PUBLIC_KEY: &str = include_str!("../fixtures/jwt_public.pem");

pub fn test_config(private_key_path: &str, public_key_path: &str) -> AuthConfig {
    AuthConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "clinic-auth-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://localhost/clinic_test".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://localhost".to_string(),
        },
        jwt: JwtConfig {
            private_key_path: private_key_path.to_string(),
            public_key_path: public_key_path.to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 587,
            user: String::new(),
            password: String::new(),
            from_email: "noreply@localhost".to_string(),
        },
        verification: VerificationConfig::default(),
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            admin_api_key: TEST_ADMIN_API_KEY.to_string(),
        },
        swagger: SwaggerConfig { enabled: false },
        rate_limit: RateLimitConfig {
            login_attempts: 1000,
            login_window_seconds: 60,
            register_attempts: 1000,
            register_window_seconds: 60,
            resend_attempts: 1000,
            resend_window_seconds: 60,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
        },
    }
}

fn key_file(pem: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create key file");
    file.write_all(pem.as_bytes()).expect("Failed to write key file");
    file
}

/// The router plus handles on the test doubles behind it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub repo: Arc<InMemoryRepository>,
    pub cache: Arc<MockCache>,
    pub notifier: Arc<MockNotifier>,
    _key_files: (NamedTempFile, NamedTempFile),
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::spawn_with(|_| {})
    }

    pub fn spawn_with(customize: impl FnOnce(&mut AuthConfig)) -> Self {
        let private_key = key_file(TEST_PRIVATE_KEY);
        let public_key = key_file(TEST_PUBLIC_KEY);

        let mut config = test_config(
            &private_key.path().to_string_lossy(),
            &public_key.path().to_string_lossy(),
        );
        customize(&mut config);

        let jwt = JwtService::new(&config.jwt).expect("Failed to create JWT service");
        let repo = Arc::new(InMemoryRepository::new());
        let cache = Arc::new(MockCache::new());
        let notifier = Arc::new(MockNotifier::new());

        let state = AppState::new(
            config,
            Backends {
                repo: repo.clone(),
                cache: cache.clone(),
                notifier: notifier.clone(),
                hasher: Arc::new(Argon2Hasher::with_cost(8, 1, 1).expect("argon2 params")),
                jwt,
                metrics_handle: None,
            },
        );

        Self {
            router: build_router(state.clone()),
            state,
            repo,
            cache,
            notifier,
            _key_files: (private_key, public_key),
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 8080))));
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        let bearer = token.map(|t| format!("Bearer {}", t));
        let headers: Vec<(&str, &str)> = bearer
            .as_deref()
            .map(|b| vec![("Authorization", b)])
            .unwrap_or_default();
        self.send(Method::GET, uri, None, &headers).await
    }

    pub async fn post(&self, uri: &str, body: Value, token: Option<&str>) -> TestResponse {
        let bearer = token.map(|t| format!("Bearer {}", t));
        let headers: Vec<(&str, &str)> = bearer
            .as_deref()
            .map(|b| vec![("Authorization", b)])
            .unwrap_or_default();
        self.send(Method::POST, uri, Some(body), &headers).await
    }

    pub async fn patch(&self, uri: &str, body: Value, token: &str) -> TestResponse {
        let bearer = format!("Bearer {}", token);
        self.send(Method::PATCH, uri, Some(body), &[("Authorization", &bearer)])
            .await
    }

    pub async fn admin_post(&self, uri: &str, body: Value) -> TestResponse {
        self.send(
            Method::POST,
            uri,
            Some(body),
            &[("x-admin-api-key", TEST_ADMIN_API_KEY)],
        )
        .await
    }

    /// Registers `email` with the shared password and returns the 201 body.
    pub async fn register(&self, email: &str, role: &str) -> Value {
        let response = self
            .post(
                "/register",
                json!({
                    "email": email,
                    "password": PASSWORD,
                    "password_confirm": PASSWORD,
                    "first_name": "Jane",
                    "last_name": "Doe",
                    "role": role,
                }),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body
    }

    pub async fn login(&self, email: &str) -> Value {
        let response = self
            .post("/login", json!({ "email": email, "password": PASSWORD }), None)
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        response.body
    }

    /// Registers a patient, then signs in again for a second session.
    pub async fn register_and_login(&self, email: &str) -> Value {
        self.register(email, "patient").await;
        self.login(email).await
    }

    pub async fn verification_tokens(&self, user_id: Uuid) -> Vec<clinic_auth_service::models::VerificationToken> {
        self.repo.list_verification_tokens(user_id).await.unwrap()
    }

    /// The newest token issued to `user_id`.
    pub async fn latest_token(&self, user_id: Uuid) -> Uuid {
        self.verification_tokens(user_id)
            .await
            .into_iter()
            .max_by_key(|t| t.id)
            .expect("no verification token issued")
            .token
    }
}

pub fn user_id(body: &Value) -> Uuid {
    body["user"]["id"].as_str().unwrap().parse().unwrap()
}

pub fn access_token(body: &Value) -> String {
    body["access_token"].as_str().unwrap().to_string()
}

pub fn refresh_token(body: &Value) -> String {
    body["refresh_token"].as_str().unwrap().to_string()
}
