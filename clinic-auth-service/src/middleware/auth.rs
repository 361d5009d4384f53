use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::IntoResponse,
    Json,
};

use crate::{dtos::ErrorResponse, models::User, services::AccessTokenClaims, services::TokenError, AppState};

type Rejection = (StatusCode, Json<ErrorResponse>);

fn reject(status: StatusCode, message: &str) -> Rejection {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
            details: None,
        }),
    )
}

/// Requires a live bearer access token whose user still exists and is active.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, Rejection> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            reject(
                StatusCode::UNAUTHORIZED,
                "Missing or invalid Authorization header",
            )
        })?;

    let claims = state.jwt.validate_access_token(token).map_err(|e| match e {
        TokenError::Expired => reject(StatusCode::UNAUTHORIZED, "Token has expired"),
        TokenError::Invalid => reject(StatusCode::UNAUTHORIZED, "Invalid token"),
    })?;

    // Fail closed when the blacklist cannot be consulted.
    let is_blacklisted = state.cache.is_blacklisted(&claims.jti).await.map_err(|e| {
        tracing::error!(error = %e, "Cache error checking token blacklist");
        reject(StatusCode::SERVICE_UNAVAILABLE, "Service temporarily unavailable")
    })?;
    if is_blacklisted {
        return Err(reject(StatusCode::UNAUTHORIZED, "Token has been revoked"));
    }

    let user_id = claims
        .user_id()
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Invalid token"))?;
    let user = state
        .repo
        .find_user_by_id(user_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to load authenticated user");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        })?
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "User not found"))?;
    if !user.is_active {
        return Err(reject(StatusCode::FORBIDDEN, "User account is deactivated"));
    }

    req.extensions_mut().insert(AuthUser { claims, user });

    Ok(next.run(req).await)
}

/// Caller identity placed in request extensions by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub claims: AccessTokenClaims,
    pub user: User,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthUser>().cloned().ok_or_else(|| {
            reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Auth context missing from request extensions",
            )
        })
    }
}
