//! Read models assembled by the store for the back-office screens, plus the
//! list filters those screens send.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tourdesk_booking::{
    Booking, BookingBalance, BookingStatus, Passenger, Payment, PaymentMethod, PaymentStatus,
};
use tourdesk_catalog::{
    EstimateLine, InstanceStatus, ProviderType, Service, Provider, Tour, TourInstance, TourTemplate,
};
use tourdesk_shared::{amount_in_range, is_plausible_email, Masked, MAX_AMOUNT_CENTS};
use uuid::Uuid;

use crate::assignment::TripAssignment;
use crate::identity::Role;
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Serialize)]
pub struct TourDetail {
    pub tour: Tour,
    pub templates: Vec<TourTemplate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateDetail {
    pub template: TourTemplate,
    pub tour_name: String,
    pub services: Vec<EstimateLine>,
    pub guides: Vec<TripAssignment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateServiceInput {
    pub service_id: Uuid,
    pub quantity: i32,
}

pub const MAX_SERVICE_QUANTITY: i32 = 1_000;

/// Departure row in lists, with seats sold.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceSummary {
    pub instance: TourInstance,
    pub tour_name: String,
    pub template_title: String,
    pub unit_price_cents: i64,
    pub booked_seats: i32,
    pub seats_available: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceDetail {
    #[serde(flatten)]
    pub summary: InstanceSummary,
    pub guides: Vec<TripAssignment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingDetail {
    pub booking: Booking,
    pub tour_name: String,
    pub start_date: NaiveDate,
    pub passengers: Vec<Passenger>,
    pub payments: Vec<Payment>,
    pub balance: BookingBalance,
}

/// A booking after a write that re-settles its balance. `previous_status` is set
/// when settlement moved the booking to another status.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub detail: BookingDetail,
    pub previous_status: Option<BookingStatus>,
}

impl Settlement {
    pub fn status_change(&self) -> Option<(BookingStatus, BookingStatus)> {
        self.previous_status.map(|from| (from, self.detail.booking.status))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingUpdate {
    pub customer_name: Option<String>,
    pub customer_email: Option<Masked<String>>,
    pub customer_phone: Option<Masked<String>>,
    pub notes: Option<String>,
}

impl BookingUpdate {
    pub fn validate(&self) -> CoreResult<()> {
        if matches!(&self.customer_name, Some(name) if name.trim().is_empty()) {
            return Err(CoreError::ValidationError("customer_name must not be empty".into()));
        }
        if let Some(email) = &self.customer_email {
            if !is_plausible_email(email.expose()) {
                return Err(CoreError::ValidationError("customer_email is not a valid email".into()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentInput {
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentInput {
    pub fn validate(&self) -> CoreResult<()> {
        if self.amount_cents <= 0 || !amount_in_range(self.amount_cents) {
            return Err(CoreError::ValidationError(format!(
                "amount_cents must be between 1 and {}",
                MAX_AMOUNT_CENTS
            )));
        }
        Ok(())
    }
}

/// Assignment as listed on a guide's own screen.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentView {
    pub assignment: TripAssignment,
    pub tour_name: String,
    pub template_title: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpcomingDeparture {
    pub tour_instance_id: Uuid,
    pub tour_name: String,
    pub template_title: String,
    pub start_date: NaiveDate,
    pub capacity: i32,
    pub booked_seats: i32,
    pub unconfirmed_guides: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub upcoming_departures: Vec<UpcomingDeparture>,
    pub pending_bookings: i64,
    pub revenue_this_month_cents: i64,
    pub outstanding_balance_cents: i64,
    pub pending_assignments: i64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TourFilter {
    pub search: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceFilter {
    pub status: Option<InstanceStatus>,
    pub template_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub tour_instance_id: Option<Uuid>,
    pub search: Option<String>,
    /// Departure start date window, inclusive.
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentFilter {
    pub method: Option<PaymentMethod>,
    pub status: Option<PaymentStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderFilter {
    pub provider_type: Option<ProviderType>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderDetail {
    pub provider: Provider,
    pub services: Vec<Service>,
}

/// `%term%` for ILIKE, with the wildcard characters in the term escaped.
pub fn like_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booking_update_checks_only_given_fields() {
        let update: BookingUpdate = serde_json::from_str(r#"{"notes": "vegetarian meals"}"#).unwrap();
        update.validate().unwrap();

        let update: BookingUpdate = serde_json::from_str(r#"{"customer_email": "nope"}"#).unwrap();
        assert!(update.validate().is_err());

        let update: BookingUpdate = serde_json::from_str(r#"{"customer_name": " "}"#).unwrap();
        assert!(update.validate().is_err());
    }

    #[test]
    fn payment_amounts_are_bounded() {
        let input: PaymentInput = serde_json::from_str(r#"{"amount_cents": 0, "method": "cash"}"#).unwrap();
        assert!(input.validate().is_err());

        let input: PaymentInput =
            serde_json::from_str(r#"{"amount_cents": 9223372036854775807, "method": "card"}"#).unwrap();
        assert!(input.validate().is_err());

        let input: PaymentInput = serde_json::from_str(r#"{"amount_cents": 25000, "method": "card"}"#).unwrap();
        input.validate().unwrap();
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" santorini "), "%santorini%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
