//! What a guide sees on the road: their assignments, the passenger manifest of
//! departures they are confirmed on, check-ins and trip notes.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tourdesk_core::assignment::TripAssignment;
use tourdesk_core::field::{CheckIn, CheckInInput, ManifestEntry, TripNote, TripNoteInput};
use tourdesk_core::views::AssignmentView;
use tourdesk_shared::DomainEvent;
use uuid::Uuid;

use crate::{
    error::AppError,
    extract::{JsonBody, PathId},
    middleware::StaffClaims,
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
struct AssignmentResponse {
    #[serde(default)]
    note: Option<String>,
}

impl AssignmentResponse {
    /// The body is optional; an empty one means no note.
    fn parse(body: &Bytes) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("invalid response body: {}", e)))
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/guide/assignments", get(my_assignments))
        .route("/v1/guide/assignments/{id}/confirm", post(confirm_assignment))
        .route("/v1/guide/assignments/{id}/decline", post(decline_assignment))
        .route("/v1/guide/instances/{id}/manifest", get(manifest))
        .route("/v1/guide/instances/{id}/check-ins", get(list_check_ins).post(record_check_in))
        .route("/v1/guide/instances/{id}/notes", get(list_notes).post(add_note))
}

/// The confirmed assignment that lets the caller work this departure.
async fn operating(state: &AppState, guide_id: Uuid, instance_id: Uuid) -> Result<TripAssignment, AppError> {
    state
        .field
        .operating_assignment(guide_id, instance_id)
        .await?
        .ok_or_else(|| AppError::AuthorizationError("you are not confirmed on this departure".into()))
}

async fn my_assignments(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
) -> Result<Json<Vec<AssignmentView>>, AppError> {
    Ok(Json(state.field.list_guide_assignments(claims.sub).await?))
}

async fn respond(
    state: &AppState,
    guide_id: Uuid,
    assignment_id: Uuid,
    accept: bool,
    body: &Bytes,
) -> Result<Json<TripAssignment>, AppError> {
    let response = AssignmentResponse::parse(body)?;
    let assignment = state
        .field
        .respond_assignment(assignment_id, guide_id, accept, response.note)
        .await?;

    state.publish(DomainEvent::AssignmentResponded {
        assignment_id: assignment.id,
        guide_id,
        status: assignment.status.to_string(),
        at: Utc::now(),
    });
    Ok(Json(assignment))
}

async fn confirm_assignment(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    PathId(id): PathId<Uuid>,
    body: Bytes,
) -> Result<Json<TripAssignment>, AppError> {
    respond(&state, claims.sub, id, true, &body).await
}

async fn decline_assignment(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    PathId(id): PathId<Uuid>,
    body: Bytes,
) -> Result<Json<TripAssignment>, AppError> {
    respond(&state, claims.sub, id, false, &body).await
}

async fn manifest(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    PathId(instance_id): PathId<Uuid>,
) -> Result<Json<Vec<ManifestEntry>>, AppError> {
    operating(&state, claims.sub, instance_id).await?;
    Ok(Json(state.tours.manifest(instance_id).await?))
}

async fn list_check_ins(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    PathId(instance_id): PathId<Uuid>,
) -> Result<Json<Vec<CheckIn>>, AppError> {
    operating(&state, claims.sub, instance_id).await?;
    Ok(Json(state.field.list_check_ins(instance_id).await?))
}

async fn record_check_in(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    PathId(instance_id): PathId<Uuid>,
    JsonBody(input): JsonBody<CheckInInput>,
) -> Result<(StatusCode, Json<CheckIn>), AppError> {
    let assignment = operating(&state, claims.sub, instance_id).await?;
    let check_in = state.field.record_check_in(instance_id, &assignment, &input).await?;

    state.publish(DomainEvent::CheckInRecorded {
        check_in_id: check_in.id,
        tour_instance_id: instance_id,
        waypoint: check_in.waypoint.clone(),
        present: check_in.present_count(),
        absent: check_in.absent_count(),
        at: Utc::now(),
    });
    Ok((StatusCode::CREATED, Json(check_in)))
}

async fn list_notes(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    PathId(instance_id): PathId<Uuid>,
) -> Result<Json<Vec<TripNote>>, AppError> {
    operating(&state, claims.sub, instance_id).await?;
    Ok(Json(state.field.list_notes(instance_id).await?))
}

async fn add_note(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    PathId(instance_id): PathId<Uuid>,
    JsonBody(input): JsonBody<TripNoteInput>,
) -> Result<(StatusCode, Json<TripNote>), AppError> {
    input.validate()?;
    let assignment = operating(&state, claims.sub, instance_id).await?;
    let note = state.field.add_note(instance_id, &assignment, &input).await?;
    tracing::info!("Guide {} added a {} note to departure {}", claims.sub, note.category.as_str(), instance_id);
    Ok((StatusCode::CREATED, Json(note)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_body_is_optional() {
        assert!(AssignmentResponse::parse(&Bytes::new()).unwrap().note.is_none());

        let with_note = AssignmentResponse::parse(&Bytes::from_static(br#"{"note":"see you at the port"}"#)).unwrap();
        assert_eq!(with_note.note.as_deref(), Some("see you at the port"));

        assert!(AssignmentResponse::parse(&Bytes::from_static(b"{oops")).is_err());
    }
}
