use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tourdesk_core::identity::{NewUser, User, UserUpdate};
use tourdesk_core::views::UserFilter;
use tourdesk_shared::{Page, PageRequest};
use uuid::Uuid;

use crate::{
    auth::hash_in_background,
    error::AppError,
    extract::{JsonBody, PathId, QueryParams},
    state::AppState,
};

/// Admin-only user management.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/users", get(list_users).post(create_user))
        .route(
            "/v1/admin/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
}

/// Guides an operator can pick from when staffing a trip.
pub fn guide_directory() -> Router<AppState> {
    Router::new().route("/v1/guides", get(list_guides))
}

async fn list_users(
    State(state): State<AppState>,
    QueryParams(filter): QueryParams<UserFilter>,
    QueryParams(page): QueryParams<PageRequest>,
) -> Result<Json<Page<User>>, AppError> {
    Ok(Json(state.users.list_users(&filter, &page).await?))
}

async fn create_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<NewUser>,
) -> Result<(StatusCode, Json<User>), AppError> {
    input.validate()?;
    let hash = hash_in_background(input.password.clone(), state.auth.bcrypt_cost).await?;
    let user = state.users.create_user(&input, &hash).await?;
    tracing::info!("Created {} user {}", user.role, user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(State(state): State<AppState>, PathId(id): PathId<Uuid>) -> Result<Json<User>, AppError> {
    let user = state.users.get_user(id).await?.ok_or_else(|| AppError::not_found("user"))?;
    Ok(Json(user))
}

async fn update_user(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    JsonBody(update): JsonBody<UserUpdate>,
) -> Result<Json<User>, AppError> {
    update.validate()?;
    let hash = match &update.password {
        Some(password) => Some(hash_in_background(password.clone(), state.auth.bcrypt_cost).await?),
        None => None,
    };
    Ok(Json(state.users.update_user(id, &update, hash).await?))
}

async fn delete_user(State(state): State<AppState>, PathId(id): PathId<Uuid>) -> Result<StatusCode, AppError> {
    state.users.delete_user(id).await?;
    tracing::info!("Deleted user {}", id);
    Ok(StatusCode::NO_CONTENT)
}

async fn list_guides(State(state): State<AppState>) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.users.list_guides().await?))
}
