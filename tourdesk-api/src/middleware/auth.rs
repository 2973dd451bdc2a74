use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tourdesk_core::identity::{Role, User};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::{AppState, AuthConfig};

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StaffClaims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub exp: usize,
}

pub fn issue_token(user: &User, auth: &AuthConfig) -> Result<String, AppError> {
    let claims = StaffClaims {
        sub: user.id,
        email: user.email.clone(),
        role: user.role,
        exp: (Utc::now() + Duration::seconds(auth.expiration as i64)).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(auth.secret.as_bytes()))
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))
}

fn read_claims(state: &AppState, req: &Request) -> Result<StaffClaims, AppError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| AppError::AuthenticationError("missing bearer token".into()))?;

    let token_data = decode::<StaffClaims>(
        bearer.token(),
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        AppError::AuthenticationError("invalid or expired token".into())
    })?;

    Ok(token_data.claims)
}

/// Verify the token, then gate on the account as stored now: a deactivated,
/// deleted or re-roled user loses access without waiting for the token to expire.
async fn authorize(
    state: &AppState,
    mut req: Request,
    next: Next,
    allowed: fn(&Role) -> bool,
) -> Result<Response, AppError> {
    let mut claims = read_claims(state, &req)?;
    let user = state
        .users
        .get_user(claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::AuthenticationError("account no longer active".into()))?;

    if user.role != claims.role {
        tracing::debug!("User {} now holds role {} (token says {})", user.id, user.role, claims.role);
        claims.role = user.role;
    }
    if !allowed(&claims.role) {
        return Err(AppError::AuthorizationError(format!(
            "role '{}' may not access this resource",
            claims.role
        )));
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

// ============================================================================
// Role gates
// ============================================================================

/// Any signed-in user.
pub async fn require_login(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, AppError> {
    authorize(&state, req, next, |_| true).await
}

/// Users and employees.
pub async fn require_admin(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, AppError> {
    authorize(&state, req, next, Role::can_manage_staff).await
}

/// Tours, bookings, providers, payments and assignments.
pub async fn require_operations(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(&state, req, next, Role::can_manage_operations).await
}

pub async fn require_guide(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, AppError> {
    authorize(&state, req, next, Role::is_guide).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_config() -> AuthConfig {
        AuthConfig {
            secret: "test-secret".into(),
            expiration: 60,
            bcrypt_cost: 4,
            login_attempts_per_minute: 10,
            decoy_hash: String::new(),
        }
    }

    #[test]
    fn issued_tokens_decode_with_the_same_secret() {
        let user = User {
            id: Uuid::new_v4(),
            name: "Eleni".into(),
            email: "eleni@tourdesk.example".into(),
            role: Role::Manager,
            is_active: true,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let auth = auth_config();
        let token = issue_token(&user, &auth).unwrap();

        let decoded = decode::<StaffClaims>(
            &token,
            &DecodingKey::from_secret(auth.secret.as_bytes()),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(decoded.claims.sub, user.id);
        assert_eq!(decoded.claims.role, Role::Manager);

        let wrong = decode::<StaffClaims>(&token, &DecodingKey::from_secret(b"other"), &Validation::default());
        assert!(wrong.is_err());
    }
}
