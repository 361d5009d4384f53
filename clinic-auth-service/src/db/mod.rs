//! PostgreSQL pool and schema migrations.

use crate::config::DatabaseConfig;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

const CONNECT_ATTEMPTS: u32 = 5;

/// Builds the pool, retrying with a doubling delay while the server is still
/// coming up.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, AppError> {
    let target = redact_url(&config.url);
    let mut delay = Duration::from_millis(500);

    for attempt in 1..=CONNECT_ATTEMPTS {
        tracing::info!(database = %target, attempt, "Connecting to PostgreSQL");

        let result = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.url)
            .await;

        match result {
            Ok(pool) => {
                tracing::info!(database = %target, "Connected to PostgreSQL");
                return Ok(pool);
            }
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                tracing::warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "PostgreSQL not ready");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => {
                tracing::error!(error = %e, "Giving up on PostgreSQL");
                return Err(e.into());
            }
        }
    }

    Err(AppError::ServiceUnavailable)
}

/// Applies `./migrations` in order.
pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}

/// Connection URL with the password masked, safe for logs.
pub fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_string(),
    }
}
