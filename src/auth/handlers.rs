use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::{
    audit,
    auth::{
        dto::{AuthResponse, LoginRequest, ProfileResponse, PublicUser, RegisterRequest},
        extractors::AuthUser,
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        repo::{CreateUserError, NewUser},
    },
    error::ApiError,
    state::AppState,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/profile", get(profile))
        .route("/auth/logout", post(logout))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    payload.name = payload.name.trim().to_string();

    if payload.name.is_empty() {
        return Err(ApiError::Validation("name is required".into()));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::Validation("invalid email".into()));
    }
    if payload.password.len() < 6 {
        return Err(ApiError::Validation("password too short".into()));
    }
    let role = payload
        .role
        .ok_or_else(|| ApiError::Validation("role is required".into()))?;

    // Fast-path duplicate check; the store's unique constraint stays the
    // authority if two registrations race.
    if state.users.find_by_email(&payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::Conflict("email already registered".into()));
    }

    let password_hash = hash_password(&payload.password)?;
    let user = state
        .users
        .create(NewUser {
            email: payload.email,
            password_hash,
            name: payload.name,
            role,
            is_active: true,
        })
        .await
        .map_err(|e| match e {
            CreateUserError::DuplicateEmail => {
                ApiError::Conflict("email already registered".into())
            }
            CreateUserError::Backend(e) => ApiError::Internal(e),
        })?;

    let token = JwtKeys::from_ref(&state).sign(&user)?;

    audit::record(
        state.audit.as_ref(),
        "USER_REGISTERED",
        json!({ "user_id": user.id, "email": &user.email, "role": user.role }),
    )
    .await;

    info!(user_id = %user.id, email = %user.email, role = %user.role, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: PublicUser::from(&user),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::Validation("email and password are required".into()));
    }

    // One generic message for unknown email and bad password, so the
    // endpoint cannot be used to enumerate accounts.
    let invalid = || ApiError::Authentication("invalid credentials".into());

    let user = match state.users.find_by_email(&payload.email).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "login with unknown email");
            return Err(invalid());
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login with invalid password");
        return Err(invalid());
    }

    if !user.is_active {
        warn!(user_id = %user.id, "login on deactivated account");
        return Err(ApiError::Authentication("account is not active".into()));
    }

    let token = JwtKeys::from_ref(&state).sign(&user)?;

    audit::record(
        state.audit.as_ref(),
        "USER_LOGIN",
        json!({ "user_id": user.id, "email": &user.email, "role": user.role }),
    )
    .await;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(AuthResponse {
        token,
        user: PublicUser::from(&user),
    }))
}

#[instrument(skip(state))]
pub async fn profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| ApiError::Authentication("invalid or expired token".into()))?;
    Ok(Json(ProfileResponse {
        user: PublicUser::from(&user),
    }))
}

/// Sessions are stateless JWTs; logout exists for the client contract and
/// audit trail, there is nothing to invalidate server-side.
#[instrument(skip(state))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    audit::record(
        state.audit.as_ref(),
        "USER_LOGOUT",
        json!({ "user_id": claims.sub }),
    )
    .await;
    Ok(Json(json!({})))
}
