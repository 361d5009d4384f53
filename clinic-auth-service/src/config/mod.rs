use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub smtp: SmtpConfig,
    pub verification: VerificationConfig,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub private_key_path: String,
    pub public_key_path: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from_email: String,
}

/// Verification link and resend policy.
#[derive(Debug, Clone, Deserialize)]
pub struct VerificationConfig {
    pub app_name: String,
    pub frontend_url: String,
    pub token_ttl_hours: i64,
    pub resend_limit: i64,
    pub resend_window_seconds: i64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            app_name: "Godson Herbal Clinic App".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            token_ttl_hours: crate::models::verification_token::DEFAULT_TTL_HOURS,
            resend_limit: 3,
            resend_window_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub admin_api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwaggerConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub register_attempts: u32,
    pub register_window_seconds: u64,
    pub resend_attempts: u32,
    pub resend_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("clinic-auth-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.trim().is_empty()),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", Some("redis://127.0.0.1:6379"), is_prod)?,
            },
            jwt: JwtConfig {
                private_key_path: get_env("JWT_PRIVATE_KEY_PATH", None, is_prod)?,
                public_key_path: get_env("JWT_PUBLIC_KEY_PATH", None, is_prod)?,
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    "15",
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env("JWT_REFRESH_TOKEN_EXPIRY_DAYS", "7", is_prod)?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("localhost"), is_prod)?,
                port: parse_env("SMTP_PORT", "587", is_prod)?,
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: get_env("SMTP_PASSWORD", Some(""), is_prod)?,
                from_email: get_env("FROM_EMAIL", Some("noreply@localhost"), is_prod)?,
            },
            verification: {
                let defaults = VerificationConfig::default();
                VerificationConfig {
                    app_name: get_env("APP_NAME", Some(&defaults.app_name), is_prod)?,
                    frontend_url: get_env("FRONTEND_URL", Some(&defaults.frontend_url), is_prod)?
                        .trim_end_matches('/')
                        .to_string(),
                    token_ttl_hours: parse_env("VERIFICATION_TOKEN_TTL_HOURS", "24", is_prod)?,
                    resend_limit: parse_env("VERIFICATION_RESEND_LIMIT", "3", is_prod)?,
                    resend_window_seconds: parse_env(
                        "VERIFICATION_RESEND_WINDOW_SECONDS",
                        "300",
                        is_prod,
                    )?,
                }
            },
            security: SecurityConfig {
                allowed_origins: split_list(&get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?),
                admin_api_key: get_env("ADMIN_API_KEY", None, true)?,
            },
            swagger: SwaggerConfig {
                enabled: parse_env("ENABLE_SWAGGER", if is_prod { "false" } else { "true" }, false)?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", "5", is_prod)?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "900", is_prod)?,
                register_attempts: parse_env("RATE_LIMIT_REGISTER_ATTEMPTS", "3", is_prod)?,
                register_window_seconds: parse_env(
                    "RATE_LIMIT_REGISTER_WINDOW_SECONDS",
                    "3600",
                    is_prod,
                )?,
                resend_attempts: parse_env("RATE_LIMIT_RESEND_ATTEMPTS", "5", is_prod)?,
                resend_window_seconds: parse_env("RATE_LIMIT_RESEND_WINDOW_SECONDS", "300", is_prod)?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", "100", is_prod)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    "60",
                    is_prod,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(config_error("PORT must be greater than 0"));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(config_error("JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(config_error("JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"));
        }

        if self.verification.token_ttl_hours <= 0 {
            return Err(config_error("VERIFICATION_TOKEN_TTL_HOURS must be positive"));
        }

        if self.verification.resend_limit <= 0 {
            return Err(config_error("VERIFICATION_RESEND_LIMIT must be positive"));
        }

        if self.verification.resend_window_seconds <= 0 {
            return Err(config_error("VERIFICATION_RESEND_WINDOW_SECONDS must be positive"));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(config_error(
                "DATABASE_MIN_CONNECTIONS cannot exceed DATABASE_MAX_CONNECTIONS",
            ));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(config_error("Wildcard CORS origin not allowed in production"));
            }

            if self.swagger.enabled {
                tracing::warn!("Swagger UI is publicly accessible in production");
            }
        }

        Ok(())
    }

    pub fn is_prod(&self) -> bool {
        self.environment == Environment::Prod
    }
}

fn config_error(message: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(message.to_string()))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key, Some(default), is_prod)?;
    raw.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has an invalid value: {}", key, e))
    })
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            service_name: "clinic-auth-service".to_string(),
            service_version: "test".to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            database: DatabaseConfig {
                url: "postgres://localhost/clinic".to_string(),
                max_connections: 5,
                min_connections: 1,
            },
            redis: RedisConfig {
                url: "redis://localhost".to_string(),
            },
            jwt: JwtConfig {
                private_key_path: "private.pem".to_string(),
                public_key_path: "public.pem".to_string(),
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
                allowed_origins: vec!["*".to_string()],
                admin_api_key: "key".to_string(),
            },
            swagger: SwaggerConfig { enabled: true },
            rate_limit: RateLimitConfig {
                login_attempts: 5,
                login_window_seconds: 900,
                register_attempts: 3,
                register_window_seconds: 3600,
                resend_attempts: 5,
                resend_window_seconds: 300,
                global_ip_limit: 100,
                global_ip_window_seconds: 60,
            },
        }
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Prod);
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Dev);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_get_env_defaults_only_outside_prod() {
        let key = "CLINIC_AUTH_TEST_UNSET_VARIABLE";
        assert_eq!(get_env(key, Some("fallback"), false).unwrap(), "fallback");
        assert!(get_env(key, Some("fallback"), true).is_err());
        assert!(get_env(key, None, false).is_err());
    }

    #[test]
    fn test_parse_env_uses_typed_default() {
        let value: u32 = parse_env("CLINIC_AUTH_TEST_UNSET_NUMBER", "42", false).unwrap();
        assert_eq!(value, 42);
        let bad: Result<u32, _> = parse_env("CLINIC_AUTH_TEST_UNSET_NUMBER", "many", false);
        assert!(bad.is_err());
    }

    #[test]
    fn test_split_list_trims_and_drops_empty() {
        assert_eq!(
            split_list("http://a.com, http://b.com,,"),
            vec!["http://a.com".to_string(), "http://b.com".to_string()]
        );
    }

    #[test]
    fn test_validate_accepts_dev_defaults() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut c = config();
        c.verification.resend_limit = 0;
        assert!(c.validate().is_err());

        let mut c = config();
        c.jwt.access_token_expiry_minutes = 0;
        assert!(c.validate().is_err());

        let mut c = config();
        c.environment = Environment::Prod;
        assert!(c.validate().is_err(), "wildcard origin in prod");
    }
}
