use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tourdesk_booking::{Booking, BookingDraft, BookingStatus, Passenger, PassengerInput, Payment};
use tourdesk_core::views::{BookingDetail, BookingFilter, BookingUpdate, Settlement};
use tourdesk_shared::{DomainEvent, Page, PageRequest};
use uuid::Uuid;

use crate::{
    error::AppError,
    extract::{JsonBody, PathId, QueryParams},
    middleware::StaffClaims,
    state::AppState,
};

#[derive(Debug, Deserialize)]
struct StatusChange {
    status: BookingStatus,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", get(list_bookings).post(create_booking))
        .route(
            "/v1/bookings/{id}",
            get(get_booking).put(update_booking).delete(delete_booking),
        )
        .route("/v1/bookings/{id}/status", post(change_status))
        .route("/v1/bookings/{id}/passengers", post(add_passenger))
        .route("/v1/passengers/{id}", put(update_passenger).delete(remove_passenger))
}

pub(crate) fn announce_status(state: &AppState, booking_id: Uuid, from: BookingStatus, to: BookingStatus) {
    tracing::info!("Booking {} moved from {} to {}", booking_id, from, to);
    state.publish(DomainEvent::BookingStatusChanged {
        booking_id,
        from: from.to_string(),
        to: to.to_string(),
        at: Utc::now(),
    });
}

/// Publish the status move a passenger or payment write caused, if any.
pub(crate) fn announce_settlement(state: &AppState, settlement: &Settlement) {
    if let Some((from, to)) = settlement.status_change() {
        announce_status(state, settlement.detail.booking.id, from, to);
    }
}

pub(crate) fn announce_payment(state: &AppState, payment: &Payment) {
    state
        .metrics
        .payments_recorded
        .with_label_values(&[payment.method.as_str()])
        .inc();
    state.publish(DomainEvent::PaymentRecorded {
        payment_id: payment.id,
        booking_id: payment.booking_id,
        amount_cents: payment.amount_cents,
        method: payment.method.as_str().to_string(),
        at: Utc::now(),
    });
}

async fn list_bookings(
    State(state): State<AppState>,
    QueryParams(filter): QueryParams<BookingFilter>,
    QueryParams(page): QueryParams<PageRequest>,
) -> Result<Json<Page<Booking>>, AppError> {
    Ok(Json(state.bookings.list_bookings(&filter, &page).await?))
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    JsonBody(draft): JsonBody<BookingDraft>,
) -> Result<(StatusCode, Json<BookingDetail>), AppError> {
    draft.validate()?;
    let detail = state.bookings.create_booking(draft, claims.sub).await?;
    let booking = &detail.booking;
    tracing::info!(
        "Booking {} created for departure {}: {} pax, {} cents",
        booking.reference,
        booking.tour_instance_id,
        booking.passenger_count,
        booking.total_cents
    );

    state.metrics.bookings_created.inc();
    state.publish(DomainEvent::BookingCreated {
        booking_id: booking.id,
        reference: booking.reference.clone(),
        tour_instance_id: booking.tour_instance_id,
        passenger_count: booking.passenger_count,
        total_cents: booking.total_cents,
        at: Utc::now(),
    });
    for payment in &detail.payments {
        announce_payment(&state, payment);
    }
    if booking.status != BookingStatus::Pending {
        announce_status(&state, booking.id, BookingStatus::Pending, booking.status);
    }
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn get_booking(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
) -> Result<Json<BookingDetail>, AppError> {
    let detail = state
        .bookings
        .get_booking(id)
        .await?
        .ok_or_else(|| AppError::not_found("booking"))?;
    Ok(Json(detail))
}

async fn update_booking(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    JsonBody(update): JsonBody<BookingUpdate>,
) -> Result<Json<Booking>, AppError> {
    update.validate()?;
    Ok(Json(state.bookings.update_booking(id, &update).await?))
}

async fn delete_booking(State(state): State<AppState>, PathId(id): PathId<Uuid>) -> Result<StatusCode, AppError> {
    state.bookings.delete_booking(id).await?;
    tracing::info!("Deleted booking {}", id);
    Ok(StatusCode::NO_CONTENT)
}

async fn change_status(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    JsonBody(change): JsonBody<StatusChange>,
) -> Result<Json<Booking>, AppError> {
    let (booking, previous) = state.bookings.change_status(id, change.status).await?;
    announce_status(&state, booking.id, previous, booking.status);
    Ok(Json(booking))
}

async fn add_passenger(
    State(state): State<AppState>,
    PathId(booking_id): PathId<Uuid>,
    JsonBody(input): JsonBody<PassengerInput>,
) -> Result<(StatusCode, Json<BookingDetail>), AppError> {
    input.validate()?;
    let settlement = state.bookings.add_passenger(booking_id, &input).await?;
    announce_settlement(&state, &settlement);
    Ok((StatusCode::CREATED, Json(settlement.detail)))
}

async fn update_passenger(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    JsonBody(input): JsonBody<PassengerInput>,
) -> Result<Json<Passenger>, AppError> {
    input.validate()?;
    Ok(Json(state.bookings.update_passenger(id, &input).await?))
}

async fn remove_passenger(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
) -> Result<Json<BookingDetail>, AppError> {
    let settlement = state.bookings.remove_passenger(id).await?;
    announce_settlement(&state, &settlement);
    Ok(Json(settlement.detail))
}
