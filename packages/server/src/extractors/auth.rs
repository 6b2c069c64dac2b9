use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};

use crate::error::AppError;
use crate::state::AppState;
use crate::utils::jwt;

/// Authenticated caller extracted from the `Authorization: Bearer <token>` header.
///
/// Add this as a handler parameter to require authentication. Ownership of
/// individual records is checked by the service layer against `owner_id`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// `sub` claim of the verified token.
    pub owner_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
}

impl AuthUser {
    /// Verify a raw bearer token.
    pub fn from_token(token: &str, secret: &str) -> Result<Self, AppError> {
        let claims = jwt::verify(token, secret).map_err(|_| AppError::TokenInvalid)?;
        if claims.sub.is_empty() {
            return Err(AppError::TokenInvalid);
        }
        Ok(AuthUser {
            owner_id: claims.sub,
            name: claims.name,
            email: claims.email,
            image: claims.picture,
        })
    }
}

/// Token carried by the `Authorization` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AppError> {
    let Some(raw) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = raw.to_str().map_err(|_| AppError::TokenInvalid)?;
    value
        .strip_prefix("Bearer ")
        .map(Some)
        .ok_or(AppError::TokenInvalid)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?.ok_or(AppError::TokenMissing)?;
        AuthUser::from_token(token, &state.config.auth.jwt_secret)
    }
}
