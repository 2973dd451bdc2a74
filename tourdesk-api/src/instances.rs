use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use tourdesk_catalog::{InstanceChanges, InstanceStatus, TourInstance};
use tourdesk_core::assignment::{AssignmentTarget, TripAssignment};
use tourdesk_core::field::{CheckIn, ManifestEntry, TripNote};
use tourdesk_core::views::{InstanceDetail, InstanceFilter, InstanceSummary};
use tourdesk_shared::{DomainEvent, Page, PageRequest};
use uuid::Uuid;

use crate::{
    error::AppError,
    extract::{JsonBody, PathId, QueryParams},
    state::AppState,
    tours::GuideSelection,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/instances", get(list_instances))
        .route(
            "/v1/instances/{id}",
            get(get_instance).put(update_instance).delete(delete_instance),
        )
        .route("/v1/instances/{id}/cancel", post(cancel_instance))
        .route("/v1/instances/{id}/complete", post(complete_instance))
        .route("/v1/instances/{id}/guides", put(set_instance_guides))
        .route("/v1/instances/{id}/manifest", get(manifest))
        .route("/v1/instances/{id}/check-ins", get(list_check_ins))
        .route("/v1/instances/{id}/notes", get(list_notes))
}

async fn list_instances(
    State(state): State<AppState>,
    QueryParams(filter): QueryParams<InstanceFilter>,
    QueryParams(page): QueryParams<PageRequest>,
) -> Result<Json<Page<InstanceSummary>>, AppError> {
    Ok(Json(state.tours.list_instances(&filter, &page).await?))
}

async fn get_instance(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
) -> Result<Json<InstanceDetail>, AppError> {
    let detail = state
        .tours
        .get_instance(id)
        .await?
        .ok_or_else(|| AppError::not_found("departure"))?;
    Ok(Json(detail))
}

async fn update_instance(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    JsonBody(changes): JsonBody<InstanceChanges>,
) -> Result<Json<TourInstance>, AppError> {
    Ok(Json(state.tours.update_instance(id, changes).await?))
}

async fn delete_instance(State(state): State<AppState>, PathId(id): PathId<Uuid>) -> Result<StatusCode, AppError> {
    state.tours.delete_instance(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn close_instance(state: &AppState, id: Uuid, next: InstanceStatus) -> Result<Json<TourInstance>, AppError> {
    let (instance, bookings_affected) = state.tours.change_instance_status(id, next).await?;
    tracing::info!(
        "Departure {} is now {} ({} bookings updated)",
        id,
        instance.status.as_str(),
        bookings_affected
    );

    state.publish(DomainEvent::InstanceStatusChanged {
        tour_instance_id: id,
        status: instance.status.as_str().to_string(),
        bookings_affected,
        at: Utc::now(),
    });
    Ok(Json(instance))
}

async fn cancel_instance(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
) -> Result<Json<TourInstance>, AppError> {
    close_instance(&state, id, InstanceStatus::Cancelled).await
}

async fn complete_instance(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
) -> Result<Json<TourInstance>, AppError> {
    close_instance(&state, id, InstanceStatus::Completed).await
}

async fn set_instance_guides(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    JsonBody(selection): JsonBody<GuideSelection>,
) -> Result<Json<Vec<TripAssignment>>, AppError> {
    let assignments = state
        .tours
        .set_guides(AssignmentTarget::Instance(id), &selection.guide_ids)
        .await?;
    Ok(Json(assignments))
}

async fn manifest(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
) -> Result<Json<Vec<ManifestEntry>>, AppError> {
    Ok(Json(state.tours.manifest(id).await?))
}

async fn list_check_ins(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
) -> Result<Json<Vec<CheckIn>>, AppError> {
    Ok(Json(state.field.list_check_ins(id).await?))
}

async fn list_notes(State(state): State<AppState>, PathId(id): PathId<Uuid>) -> Result<Json<Vec<TripNote>>, AppError> {
    Ok(Json(state.field.list_notes(id).await?))
}
