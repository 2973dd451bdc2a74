use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use tourdesk_booking::{BookingBalance, BookingStatus, Payment};
use tourdesk_core::views::{PaymentFilter, PaymentInput, Settlement};
use tourdesk_shared::{DomainEvent, Page, PageRequest};
use uuid::Uuid;

use crate::{
    bookings::{announce_payment, announce_settlement},
    error::AppError,
    extract::{JsonBody, PathId, QueryParams},
    middleware::StaffClaims,
    state::AppState,
};

/// A payment write together with the booking balance it left behind.
#[derive(Debug, Serialize)]
struct PaymentReceipt {
    payment: Payment,
    booking_status: BookingStatus,
    balance: BookingBalance,
}

impl PaymentReceipt {
    fn new(payment: Payment, settlement: &Settlement) -> Self {
        Self {
            payment,
            booking_status: settlement.detail.booking.status,
            balance: settlement.detail.balance,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/payments", get(list_payments))
        .route("/v1/payments/{id}", delete(delete_payment))
        .route("/v1/payments/{id}/refund", post(refund_payment))
        .route("/v1/bookings/{id}/payments", get(booking_payments).post(record_payment))
}

async fn list_payments(
    State(state): State<AppState>,
    QueryParams(filter): QueryParams<PaymentFilter>,
    QueryParams(page): QueryParams<PageRequest>,
) -> Result<Json<Page<Payment>>, AppError> {
    Ok(Json(state.bookings.list_payments(&filter, &page).await?))
}

async fn booking_payments(
    State(state): State<AppState>,
    PathId(booking_id): PathId<Uuid>,
) -> Result<Json<Vec<Payment>>, AppError> {
    let detail = state
        .bookings
        .get_booking(booking_id)
        .await?
        .ok_or_else(|| AppError::not_found("booking"))?;
    Ok(Json(detail.payments))
}

async fn record_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    PathId(booking_id): PathId<Uuid>,
    JsonBody(input): JsonBody<PaymentInput>,
) -> Result<(StatusCode, Json<PaymentReceipt>), AppError> {
    input.validate()?;
    let (payment, settlement) = state.bookings.record_payment(booking_id, &input, claims.sub).await?;
    tracing::info!(
        "Recorded {} payment of {} cents on booking {}",
        payment.method,
        payment.amount_cents,
        booking_id
    );

    announce_payment(&state, &payment);
    announce_settlement(&state, &settlement);
    Ok((StatusCode::CREATED, Json(PaymentReceipt::new(payment, &settlement))))
}

async fn refund_payment(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
) -> Result<Json<PaymentReceipt>, AppError> {
    let (payment, settlement) = state.bookings.refund_payment(id).await?;
    tracing::info!("Refunded payment {} ({} cents)", payment.id, payment.amount_cents);

    state.publish(DomainEvent::PaymentRefunded {
        payment_id: payment.id,
        booking_id: payment.booking_id,
        amount_cents: payment.amount_cents,
        at: Utc::now(),
    });
    announce_settlement(&state, &settlement);
    Ok(Json(PaymentReceipt::new(payment, &settlement)))
}

async fn delete_payment(State(state): State<AppState>, PathId(id): PathId<Uuid>) -> Result<StatusCode, AppError> {
    let settlement = state.bookings.delete_payment(id).await?;
    announce_settlement(&state, &settlement);
    Ok(StatusCode::NO_CONTENT)
}
