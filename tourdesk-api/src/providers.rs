use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use tourdesk_catalog::{Provider, ProviderInput, Service, ServiceInput};
use tourdesk_core::views::{ProviderDetail, ProviderFilter};
use tourdesk_shared::{Page, PageRequest};
use uuid::Uuid;

use crate::{
    error::AppError,
    extract::{JsonBody, PathId, QueryParams},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/providers", get(list_providers).post(create_provider))
        .route(
            "/v1/providers/{id}",
            get(get_provider).put(update_provider).delete(delete_provider),
        )
        .route("/v1/providers/{id}/services", get(list_services).post(create_service))
        .route("/v1/services/{id}", put(update_service).delete(delete_service))
}

async fn list_providers(
    State(state): State<AppState>,
    QueryParams(filter): QueryParams<ProviderFilter>,
    QueryParams(page): QueryParams<PageRequest>,
) -> Result<Json<Page<Provider>>, AppError> {
    Ok(Json(state.providers.list_providers(&filter, &page).await?))
}

async fn create_provider(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<ProviderInput>,
) -> Result<(StatusCode, Json<Provider>), AppError> {
    input.validate()?;
    let provider = state.providers.create_provider(&input).await?;
    tracing::info!("Created {} provider {}", provider.provider_type.as_str(), provider.id);
    Ok((StatusCode::CREATED, Json(provider)))
}

async fn get_provider(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
) -> Result<Json<ProviderDetail>, AppError> {
    let detail = state
        .providers
        .get_provider(id)
        .await?
        .ok_or_else(|| AppError::not_found("provider"))?;
    Ok(Json(detail))
}

async fn update_provider(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    JsonBody(input): JsonBody<ProviderInput>,
) -> Result<Json<Provider>, AppError> {
    input.validate()?;
    Ok(Json(state.providers.update_provider(id, &input).await?))
}

async fn delete_provider(State(state): State<AppState>, PathId(id): PathId<Uuid>) -> Result<StatusCode, AppError> {
    state.providers.delete_provider(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_services(
    State(state): State<AppState>,
    PathId(provider_id): PathId<Uuid>,
) -> Result<Json<Vec<Service>>, AppError> {
    state
        .providers
        .get_provider(provider_id)
        .await?
        .map(|detail| Json(detail.services))
        .ok_or_else(|| AppError::not_found("provider"))
}

async fn create_service(
    State(state): State<AppState>,
    PathId(provider_id): PathId<Uuid>,
    JsonBody(input): JsonBody<ServiceInput>,
) -> Result<(StatusCode, Json<Service>), AppError> {
    input.validate()?;
    let service = state.providers.create_service(provider_id, &input).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

async fn update_service(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    JsonBody(input): JsonBody<ServiceInput>,
) -> Result<Json<Service>, AppError> {
    input.validate()?;
    Ok(Json(state.providers.update_service(id, &input).await?))
}

async fn delete_service(State(state): State<AppState>, PathId(id): PathId<Uuid>) -> Result<StatusCode, AppError> {
    state.providers.delete_service(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
