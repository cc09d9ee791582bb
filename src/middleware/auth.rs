use axum::{extract::FromRequestParts, http::header, http::request::Parts};
use jsonwebtoken::{DecodingKey, Validation, decode};

use crate::{
    config::JwtConfig, dto::auth::Claims, error::AppError, models::ROLE_ADMIN, state::AppState,
};

/// Identity attached to every authenticated request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i32,
    pub role: String,
}

pub fn ensure_role(user: &AuthUser, role: &str) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, ROLE_ADMIN)
}

/// Validates a bearer token and resolves it to a numeric user id.
///
/// Every failure collapses into [`AppError::Unauthorized`] so callers learn
/// nothing about why a token was refused.
pub fn authenticate(token: &str, jwt: &JwtConfig) -> Result<AuthUser, AppError> {
    let mut validation = Validation::default();
    validation.set_issuer(&[jwt.issuer.as_str()]);
    validation.set_audience(&[jwt.audience.as_str()]);
    validation.leeway = 0;

    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt.secret.as_bytes()),
        &validation,
    )
    .map_err(|err| {
        tracing::debug!(error = %err, "token rejected");
        AppError::Unauthorized
    })?;

    let user_id = decoded
        .claims
        .sub
        .trim()
        .parse::<i32>()
        .map_err(|_| AppError::Unauthorized)?;

    Ok(AuthUser {
        user_id,
        role: decoded.claims.role,
    })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_str = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(AppError::Unauthorized)?
            .to_str()
            .map_err(|_| AppError::Unauthorized)?;

        let token = auth_str
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Unauthorized)?;

        authenticate(token, &state.jwt)
    }
}
