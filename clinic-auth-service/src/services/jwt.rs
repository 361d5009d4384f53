use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::{Role, User};

pub const ACCESS_TOKEN_TYPE: &str = "access";
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

/// JWT service for token generation and validation
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
}

/// Claims for access tokens (short-lived)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub typ: String,
    pub exp: i64,
    pub iat: i64,
    /// JWT ID (for blacklisting)
    pub jti: String,
}

/// Claims for refresh tokens (long-lived)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub sub: String,
    /// Refresh session ID
    pub jti: String,
    pub typ: String,
    pub exp: i64,
    pub iat: i64,
}

impl AccessTokenClaims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    /// Seconds until expiry, never negative.
    pub fn remaining_seconds(&self) -> i64 {
        (self.exp - Utc::now().timestamp()).max(0)
    }
}

impl RefreshTokenClaims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.jti).ok()
    }
}

/// Why a presented token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    Expired,
    Invalid,
}

/// A freshly signed token together with its claims.
#[derive(Debug, Clone)]
pub struct Issued<C> {
    pub token: String,
    pub claims: C,
}

trait TypedClaims {
    fn typ(&self) -> &str;
}

impl TypedClaims for AccessTokenClaims {
    fn typ(&self) -> &str {
        &self.typ
    }
}

impl TypedClaims for RefreshTokenClaims {
    fn typ(&self) -> &str {
        &self.typ
    }
}

impl JwtService {
    /// Create a new JWT service by loading RSA keys from files
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        let private_key_pem = fs::read_to_string(&config.private_key_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read private key from {}: {}",
                config.private_key_path,
                e
            )
        })?;
        let public_key_pem = fs::read_to_string(&config.public_key_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read public key from {}: {}",
                config.public_key_path,
                e
            )
        })?;

        let service = Self::from_pem(
            private_key_pem.as_bytes(),
            public_key_pem.as_bytes(),
            config.access_token_expiry_minutes,
            config.refresh_token_expiry_days,
        )?;
        tracing::info!("JWT service initialized with RS256 keys");
        Ok(service)
    }

    pub fn from_pem(
        private_key_pem: &[u8],
        public_key_pem: &[u8],
        access_token_expiry_minutes: i64,
        refresh_token_expiry_days: i64,
    ) -> Result<Self, anyhow::Error> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| anyhow::anyhow!("Failed to parse private key: {}", e))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem)
            .map_err(|e| anyhow::anyhow!("Failed to parse public key: {}", e))?;

        Ok(Self {
            encoding_key,
            decoding_key,
            access_token_expiry_minutes,
            refresh_token_expiry_days,
        })
    }

    pub fn refresh_token_expiry_days(&self) -> i64 {
        self.refresh_token_expiry_days
    }

    /// Get access token expiry in seconds (for client info)
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }

    pub fn issue_access_token(&self, user: &User) -> Result<Issued<AccessTokenClaims>, anyhow::Error> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            typ: ACCESS_TOKEN_TYPE.to_string(),
            exp: (now + Duration::minutes(self.access_token_expiry_minutes)).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = self.sign(&claims)?;
        Ok(Issued { token, claims })
    }

    /// The `jti` doubles as the refresh session's primary key.
    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<Issued<RefreshTokenClaims>, anyhow::Error> {
        let now = Utc::now();
        let claims = RefreshTokenClaims {
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            typ: REFRESH_TOKEN_TYPE.to_string(),
            exp: (now + Duration::days(self.refresh_token_expiry_days)).timestamp(),
            iat: now.timestamp(),
        };
        let token = self.sign(&claims)?;
        Ok(Issued { token, claims })
    }

    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, TokenError> {
        self.validate(token, ACCESS_TOKEN_TYPE)
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, TokenError> {
        self.validate(token, REFRESH_TOKEN_TYPE)
    }

    fn sign<C: Serialize>(&self, claims: &C) -> Result<String, anyhow::Error> {
        encode(&Header::new(Algorithm::RS256), claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode token: {}", e))
    }

    fn validate<C>(&self, token: &str, expected_typ: &str) -> Result<C, TokenError>
    where
        C: DeserializeOwned + TypedClaims,
    {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        let data = decode::<C>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;

        // An access token must never pass as a refresh token and vice versa.
        if data.claims.typ() != expected_typ {
            return Err(TokenError::Invalid);
        }
        Ok(data.claims)
    }
}
