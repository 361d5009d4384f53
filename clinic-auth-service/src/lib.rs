pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{AuthConfig, Environment};
use crate::repository::Repository;
use crate::services::{
    AuthService, CacheStore, CredentialStore, EmailVerificationService, JwtService, Notifier,
    ProfileService, ReviewService, ScheduleService, VerificationLedger,
};
use crate::utils::CredentialHasher;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::registration::register,
        handlers::auth::session::login,
        handlers::auth::session::logout,
        handlers::auth::session::refresh,
        handlers::auth::session::validate_token,
        handlers::auth::session::profile,
        handlers::auth::verification::verify_email,
        handlers::auth::verification::resend_verification,
        handlers::auth::verification::send_verification,
        handlers::patients::get_patient_profile,
        handlers::patients::update_patient_profile,
        handlers::consultants::list_specialties,
        handlers::consultants::list_consultants,
        handlers::consultants::get_consultant,
        handlers::consultants::get_own_consultant_profile,
        handlers::consultants::update_own_consultant_profile,
        handlers::consultants::list_reviews,
        handlers::consultants::add_review,
        handlers::consultants::list_availability,
        handlers::consultants::add_availability,
        handlers::admin::bootstrap_admin,
        handlers::admin::activate_user,
        handlers::admin::deactivate_user,
        handlers::admin::create_speciality,
        handlers::admin::verify_consultant,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::auth::RegistrationRole,
            dtos::auth::RegisterRequest,
            dtos::auth::LoginRequest,
            dtos::auth::AuthResponse,
            dtos::auth::LogoutRequest,
            dtos::auth::RefreshRequest,
            dtos::auth::RefreshResponse,
            dtos::auth::ValidateTokenResponse,
            dtos::auth::ProfileResponse,
            dtos::auth::VerifyEmailRequest,
            dtos::auth::VerifyEmailResponse,
            dtos::auth::VerifyEmailFailure,
            dtos::auth::ResendVerificationRequest,
            dtos::auth::EmailSentResponse,
            dtos::auth::MessageResponse,
            dtos::profile::UpdatePatientProfileRequest,
            dtos::profile::PatientProfileResponse,
            dtos::profile::UpdateConsultantProfileRequest,
            dtos::profile::CreateReviewRequest,
            dtos::profile::ReviewCreatedResponse,
            dtos::profile::CreateAvailabilityRequest,
            dtos::admin::BootstrapAdminRequest,
            dtos::admin::CreateSpecialityRequest,
            models::Role,
            models::UserResponse,
            models::Gender,
            models::BloodType,
            models::ConsultationType,
            models::PatientProfile,
            models::ConsultantProfile,
            models::Speciality,
            models::ReviewResponse,
            models::AvailabilitySlot,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Registration, sessions and tokens"),
        (name = "Email Verification", description = "Verification links and resends"),
        (name = "Patients", description = "Patient profiles"),
        (name = "Consultants", description = "Consultant directory and profiles"),
        (name = "Reviews", description = "Consultant reviews"),
        (name = "Availability", description = "Consultant weekly availability"),
        (name = "Admin", description = "Administrative operations"),
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
                "admin_api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                    middleware::ADMIN_API_KEY_HEADER,
                ))),
            );
        }
    }
}

/// Storage, delivery and signing backends the services are assembled from.
pub struct Backends {
    pub repo: Arc<dyn Repository>,
    pub cache: Arc<dyn CacheStore>,
    pub notifier: Arc<dyn Notifier>,
    pub hasher: Arc<dyn CredentialHasher>,
    pub jwt: JwtService,
    pub metrics_handle: Option<PrometheusHandle>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub repo: Arc<dyn Repository>,
    pub cache: Arc<dyn CacheStore>,
    pub jwt: JwtService,
    pub credentials: CredentialStore,
    pub auth_service: AuthService,
    pub verification_service: EmailVerificationService,
    pub profile_service: ProfileService,
    pub review_service: ReviewService,
    pub schedule_service: ScheduleService,
    pub login_rate_limiter: IpRateLimiter,
    pub register_rate_limiter: IpRateLimiter,
    pub resend_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: AuthConfig, backends: Backends) -> Self {
        let Backends {
            repo,
            cache,
            notifier,
            hasher,
            jwt,
            metrics_handle,
        } = backends;

        let credentials = CredentialStore::new(repo.clone(), hasher, cache.clone());
        let ledger = VerificationLedger::new(
            repo.clone(),
            chrono::Duration::hours(config.verification.token_ttl_hours),
        );
        let verification_service = EmailVerificationService::from_config(
            &config.verification,
            ledger,
            credentials.clone(),
            notifier,
        );
        let auth_service = AuthService::new(
            repo.clone(),
            cache.clone(),
            jwt.clone(),
            credentials.clone(),
            verification_service.clone(),
        );

        let limits = &config.rate_limit;
        let login_rate_limiter =
            create_ip_rate_limiter(limits.login_attempts, limits.login_window_seconds);
        let register_rate_limiter =
            create_ip_rate_limiter(limits.register_attempts, limits.register_window_seconds);
        let resend_rate_limiter =
            create_ip_rate_limiter(limits.resend_attempts, limits.resend_window_seconds);
        let ip_rate_limiter =
            create_ip_rate_limiter(limits.global_ip_limit, limits.global_ip_window_seconds);

        Self {
            profile_service: ProfileService::new(repo.clone()),
            review_service: ReviewService::new(repo.clone()),
            schedule_service: ScheduleService::new(repo.clone()),
            config,
            repo,
            cache,
            jwt,
            credentials,
            auth_service,
            verification_service,
            login_rate_limiter,
            register_rate_limiter,
            resend_rate_limiter,
            ip_rate_limiter,
            metrics_handle,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/admin/bootstrap", post(handlers::admin::bootstrap_admin))
        .route(
            "/admin/users/:id/activate",
            post(handlers::admin::activate_user),
        )
        .route(
            "/admin/users/:id/deactivate",
            post(handlers::admin::deactivate_user),
        )
        .route(
            "/admin/specialties",
            post(handlers::admin::create_speciality),
        )
        .route(
            "/admin/consultants/:id/verify",
            post(handlers::admin::verify_consultant),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::admin_auth_middleware,
        ));

    let login_route = Router::new()
        .route("/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let register_route = Router::new()
        .route("/register", post(handlers::auth::register))
        .layer(from_fn_with_state(
            state.register_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let resend_routes = Router::new()
        .route(
            "/resend-verification",
            post(handlers::auth::resend_verification),
        )
        .merge(
            Router::new()
                .route(
                    "/send-verification",
                    post(handlers::auth::send_verification),
                )
                .layer(from_fn_with_state(
                    state.clone(),
                    middleware::auth_middleware,
                )),
        )
        .layer(from_fn_with_state(
            state.resend_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let authenticated_routes = Router::new()
        .route("/logout", post(handlers::auth::logout))
        .route("/token/validate", get(handlers::auth::validate_token))
        .route("/profile", get(handlers::auth::profile))
        .route(
            "/patients/me/profile",
            get(handlers::patients::get_patient_profile)
                .patch(handlers::patients::update_patient_profile),
        )
        .route(
            "/consultants/me/profile",
            get(handlers::consultants::get_own_consultant_profile)
                .patch(handlers::consultants::update_own_consultant_profile),
        )
        .route(
            "/consultants/me/availability",
            post(handlers::consultants::add_availability),
        )
        .route(
            "/consultants/:id/reviews",
            post(handlers::consultants::add_review),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    let swagger_enabled =
        state.config.environment == Environment::Dev || state.config.swagger.enabled;
    if swagger_enabled {
        app = app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    let allowed_origins = cors_origins(&state.config.security.allowed_origins);

    app.route("/token/refresh", post(handlers::auth::refresh))
        .route("/verify-email", post(handlers::auth::verify_email))
        .route("/specialties", get(handlers::consultants::list_specialties))
        .route("/consultants", get(handlers::consultants::list_consultants))
        .route("/consultants/:id", get(handlers::consultants::get_consultant))
        .route(
            "/consultants/:id/reviews",
            get(handlers::consultants::list_reviews),
        )
        .route(
            "/consultants/:id/availability",
            get(handlers::consultants::list_availability),
        )
        .merge(login_route)
        .merge(register_route)
        .merge(resend_routes)
        .merge(authenticated_routes)
        .merge(admin_routes)
        .with_state(state.clone())
        .layer(from_fn_with_state(
            state.ip_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    HeaderName::from_static(middleware::ADMIN_API_KEY_HEADER),
                ]),
        )
}

/// `*` allows any origin; anything unparsable is dropped with an error log.
fn cors_origins(origins: &[String]) -> AllowOrigin {
    if origins.iter().any(|origin| origin == "*") {
        return AllowOrigin::any();
    }
    let values: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    AllowOrigin::list(values)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Database or cache is unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.repo.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        AppError::ServiceUnavailable
    })?;

    state.cache.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Redis health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "database": "up",
            "redis": "up"
        }
    })))
}
