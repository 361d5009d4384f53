use clinic_auth_service::{
    build_router,
    config::AuthConfig,
    db,
    repository::PgRepository,
    services::{JwtService, RedisService, SmtpNotifier},
    utils::Argon2Hasher,
    AppState, Backends,
};
use service_core::error::AppError;
use service_core::middleware::metrics::install_prometheus_recorder;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Fail fast on invalid configuration
    let config = AuthConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;

    let metrics_handle = install_prometheus_recorder().map_err(AppError::InternalError)?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting clinic auth service"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let cache = RedisService::new(&config.redis)
        .await
        .map_err(AppError::InternalError)?;
    tracing::info!("Redis service initialized");

    let notifier = SmtpNotifier::new(&config.smtp, &config.verification.app_name)?;

    let jwt = JwtService::new(&config.jwt).map_err(AppError::InternalError)?;
    tracing::info!("JWT service initialized");

    let state = AppState::new(
        config.clone(),
        Backends {
            repo: Arc::new(PgRepository::new(pool)),
            cache: Arc::new(cache),
            notifier: Arc::new(notifier),
            hasher: Arc::new(Argon2Hasher::default()),
            jwt,
            metrics_handle: Some(metrics_handle),
        },
    );

    let app = build_router(state);

    let addr = config.common.socket_addr();

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
