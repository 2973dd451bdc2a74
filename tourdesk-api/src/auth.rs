use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tourdesk_core::identity::{authenticate, hash_password, normalize_email, User};

use crate::{
    error::AppError,
    extract::JsonBody,
    middleware::{issue_token, login_rate_limit, require_login, StaffClaims},
    state::AppState,
};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
    token_type: &'static str,
    expires_in: u64,
    user: User,
}

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/v1/auth/login",
            post(login).layer(axum::middleware::from_fn_with_state(state.clone(), login_rate_limit)),
        )
        .route(
            "/v1/auth/me",
            get(me).layer(axum::middleware::from_fn_with_state(state.clone(), require_login)),
        )
}

async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::ValidationError("email and password are required".into()));
    }

    let email = normalize_email(&req.email);
    let found = state.users.find_credentials(&email).await?;
    let password = req.password;
    let decoy_hash = state.auth.decoy_hash.clone();
    // bcrypt blocks.
    let user = tokio::task::spawn_blocking(move || authenticate(found, &password, &decoy_hash))
        .await
        .map_err(|e| AppError::InternalServerError(format!("login task failed: {}", e)))??;

    state.users.record_login(user.id).await?;
    let token = issue_token(&user, &state.auth)?;
    tracing::info!("User {} signed in as {}", user.id, user.role);

    Ok(Json(AuthResponse {
        token,
        token_type: "Bearer",
        expires_in: state.auth.expiration,
        user,
    }))
}

async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
) -> Result<Json<User>, AppError> {
    let user = state
        .users
        .get_user(claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::AuthenticationError("account no longer active".into()))?;
    Ok(Json(user))
}

/// Hash on the blocking pool at the configured cost.
pub async fn hash_in_background(password: String, cost: u32) -> Result<String, AppError> {
    let hash = tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|e| AppError::InternalServerError(format!("hashing task failed: {}", e)))??;
    Ok(hash)
}
