use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tourdesk_catalog::{
    estimate, EstimateLine, PricingEstimate, ScheduleRequest, TemplateInput, Tour, TourInput,
    TourTemplate,
};
use tourdesk_core::assignment::{AssignmentTarget, TripAssignment};
use tourdesk_core::views::{InstanceDetail, TemplateDetail, TemplateServiceInput, TourDetail, TourFilter};
use tourdesk_shared::{DomainEvent, Page, PageRequest};
use uuid::Uuid;

use crate::{
    error::AppError,
    extract::{JsonBody, PathId, QueryParams},
    state::AppState,
};

#[derive(Debug, Deserialize)]
struct EstimateQuery {
    pax: i32,
    price_override_cents: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct GuideSelection {
    pub guide_ids: Vec<Uuid>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/tours", get(list_tours).post(create_tour))
        .route("/v1/tours/{id}", get(get_tour).put(update_tour).delete(delete_tour))
        .route("/v1/tours/{id}/templates", post(create_template))
        .route(
            "/v1/templates/{id}",
            get(get_template).put(update_template).delete(delete_template),
        )
        .route("/v1/templates/{id}/services", put(set_template_services))
        .route("/v1/templates/{id}/estimate", get(template_estimate))
        .route("/v1/templates/{id}/guides", put(set_template_guides))
        .route("/v1/templates/{id}/instances", post(schedule_instance))
}

// ============================================================================
// Tours
// ============================================================================

async fn list_tours(
    State(state): State<AppState>,
    QueryParams(filter): QueryParams<TourFilter>,
    QueryParams(page): QueryParams<PageRequest>,
) -> Result<Json<Page<Tour>>, AppError> {
    Ok(Json(state.tours.list_tours(&filter, &page).await?))
}

async fn create_tour(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<TourInput>,
) -> Result<(StatusCode, Json<Tour>), AppError> {
    input.validate()?;
    let tour = state.tours.create_tour(&input).await?;
    tracing::info!("Created tour {} ({})", tour.code, tour.id);
    Ok((StatusCode::CREATED, Json(tour)))
}

async fn get_tour(State(state): State<AppState>, PathId(id): PathId<Uuid>) -> Result<Json<TourDetail>, AppError> {
    let detail = state.tours.get_tour(id).await?.ok_or_else(|| AppError::not_found("tour"))?;
    Ok(Json(detail))
}

async fn update_tour(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    JsonBody(input): JsonBody<TourInput>,
) -> Result<Json<Tour>, AppError> {
    input.validate()?;
    Ok(Json(state.tours.update_tour(id, &input).await?))
}

async fn delete_tour(State(state): State<AppState>, PathId(id): PathId<Uuid>) -> Result<StatusCode, AppError> {
    state.tours.delete_tour(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Templates
// ============================================================================

async fn create_template(
    State(state): State<AppState>,
    PathId(tour_id): PathId<Uuid>,
    JsonBody(input): JsonBody<TemplateInput>,
) -> Result<(StatusCode, Json<TourTemplate>), AppError> {
    input.validate()?;
    let template = state.tours.create_template(tour_id, &input).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

async fn get_template(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
) -> Result<Json<TemplateDetail>, AppError> {
    let detail = state
        .tours
        .get_template(id)
        .await?
        .ok_or_else(|| AppError::not_found("template"))?;
    Ok(Json(detail))
}

async fn update_template(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    JsonBody(input): JsonBody<TemplateInput>,
) -> Result<Json<TourTemplate>, AppError> {
    input.validate()?;
    Ok(Json(state.tours.update_template(id, &input).await?))
}

async fn delete_template(State(state): State<AppState>, PathId(id): PathId<Uuid>) -> Result<StatusCode, AppError> {
    state.tours.delete_template(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_template_services(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    JsonBody(lines): JsonBody<Vec<TemplateServiceInput>>,
) -> Result<Json<Vec<EstimateLine>>, AppError> {
    Ok(Json(state.tours.set_template_services(id, &lines).await?))
}

async fn template_estimate(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    QueryParams(query): QueryParams<EstimateQuery>,
) -> Result<Json<PricingEstimate>, AppError> {
    let detail = state
        .tours
        .get_template(id)
        .await?
        .ok_or_else(|| AppError::not_found("template"))?;
    let result = estimate(&detail.template, &detail.services, query.pax, query.price_override_cents)?;
    Ok(Json(result))
}

async fn set_template_guides(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    JsonBody(selection): JsonBody<GuideSelection>,
) -> Result<Json<Vec<TripAssignment>>, AppError> {
    let assignments = state
        .tours
        .set_guides(AssignmentTarget::Template(id), &selection.guide_ids)
        .await?;
    Ok(Json(assignments))
}

async fn schedule_instance(
    State(state): State<AppState>,
    PathId(template_id): PathId<Uuid>,
    JsonBody(req): JsonBody<ScheduleRequest>,
) -> Result<(StatusCode, Json<InstanceDetail>), AppError> {
    let detail = state.tours.schedule_instance(template_id, req).await?;
    let instance = &detail.summary.instance;
    tracing::info!(
        "Scheduled departure {} of template {} on {}",
        instance.id,
        template_id,
        instance.start_date
    );

    state.publish(DomainEvent::InstanceScheduled {
        tour_instance_id: instance.id,
        template_id,
        start_date: instance.start_date,
        at: Utc::now(),
    });
    Ok((StatusCode::CREATED, Json(detail)))
}
