use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use crate::auth::claims::Claims;
use crate::auth::jwt::JwtKeys;
use crate::error::ApiError;
use crate::state::AppState;

/// Extracts and validates the Bearer token, returning the verified claims.
///
/// Beyond signature/expiry checks this re-reads the account from the
/// credential store so a deactivated user cannot keep riding a stale token
/// for the rest of its lifetime.
pub struct AuthUser(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Authentication("missing Authorization header".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or_else(|| ApiError::Authentication("invalid Authorization header".into()))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|_| {
            warn!("invalid or expired token");
            ApiError::Authentication("invalid or expired token".into())
        })?;

        match state.users.find_by_id(claims.sub).await? {
            Some(user) if user.is_active => Ok(AuthUser(claims)),
            Some(user) => {
                warn!(user_id = %user.id, "token presented for deactivated account");
                Err(ApiError::Authentication("account is not active".into()))
            }
            None => Err(ApiError::Authentication("invalid or expired token".into())),
        }
    }
}
