use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tourdesk_shared::Masked;
use uuid::Uuid;

use crate::{BookingError, BookingResult};

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Seats held by bookings in these states count against capacity.
    pub fn holds_seats(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }

    pub fn accepts_payments(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(BookingError::Validation(format!("unknown booking status '{}'", other))),
        }
    }
}

/// A customer's reservation against one departure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub reference: String,
    pub tour_instance_id: Uuid,
    pub customer_name: String,
    pub customer_email: Masked<String>,
    pub customer_phone: Option<Masked<String>>,
    pub passenger_count: i32,
    pub unit_price_cents: i64,
    pub total_cents: i64,
    pub status: BookingStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Re-price after the passenger list changed. The unit price is fixed at booking time.
    pub fn resize(&mut self, passenger_count: i32) -> BookingResult<()> {
        self.total_cents = line_total(self.unit_price_cents, passenger_count)?;
        self.passenger_count = passenger_count;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Unit price times head count, refusing totals that do not fit.
pub fn line_total(unit_price_cents: i64, passenger_count: i32) -> BookingResult<i64> {
    unit_price_cents
        .checked_mul(i64::from(passenger_count))
        .ok_or_else(|| BookingError::Validation("booking total is too large".into()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passenger {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub document_number: Option<Masked<String>>,
    pub nationality: Option<String>,
    pub is_lead: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Passenger {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PassengerInput {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub document_number: Option<Masked<String>>,
    pub nationality: Option<String>,
    #[serde(default)]
    pub is_lead: bool,
}

impl PassengerInput {
    pub fn validate(&self) -> Result<(), BookingError> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(BookingError::Validation(
                "passenger first and last name are required".into(),
            ));
        }
        if let Some(dob) = self.date_of_birth {
            if dob > Utc::now().date_naive() {
                return Err(BookingError::Validation(
                    "passenger date of birth is in the future".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    Online,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Online => "online",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "online" => Ok(PaymentMethod::Online),
            other => Err(BookingError::Validation(format!("unknown payment method '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Completed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Completed => "completed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(PaymentStatus::Completed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(BookingError::Validation(format!("unknown payment status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub recorded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Mark as refunded (never delete)
    pub fn refund(&mut self) -> Result<(), BookingError> {
        if self.status != PaymentStatus::Completed {
            return Err(BookingError::NotRefundable(self.status.to_string()));
        }
        self.status = PaymentStatus::Refunded;
        self.refunded_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment() -> Payment {
        Payment {
            id: Uuid::new_v4(),
            booking_id: Uuid::new_v4(),
            amount_cents: 10_000,
            method: PaymentMethod::Card,
            status: PaymentStatus::Completed,
            reference: None,
            notes: None,
            paid_at: Utc::now(),
            refunded_at: None,
            recorded_by: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn refund_only_once() {
        let mut p = payment();
        p.refund().unwrap();
        assert_eq!(p.status, PaymentStatus::Refunded);
        assert!(p.refunded_at.is_some());
        assert_eq!(p.refund(), Err(BookingError::NotRefundable("refunded".into())));
    }

    #[test]
    fn resize_keeps_the_booking_on_overflow() {
        let now = Utc::now();
        let mut booking = Booking {
            id: Uuid::new_v4(),
            reference: "TD-261019-A1B2C3".into(),
            tour_instance_id: Uuid::new_v4(),
            customer_name: "Maria Georgiou".into(),
            customer_email: "maria@example.com".to_string().into(),
            customer_phone: None,
            passenger_count: 2,
            unit_price_cents: i64::MAX / 3,
            total_cents: i64::MAX / 3 * 2,
            status: BookingStatus::Pending,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        assert!(booking.resize(4).is_err());
        assert_eq!(booking.passenger_count, 2);

        booking.unit_price_cents = 12_500;
        booking.resize(3).unwrap();
        assert_eq!(booking.total_cents, 37_500);
    }

    #[test]
    fn cancelled_bookings_release_seats() {
        assert!(BookingStatus::Pending.holds_seats());
        assert!(BookingStatus::Completed.holds_seats());
        assert!(!BookingStatus::Cancelled.holds_seats());
    }

    #[test]
    fn payment_method_wire_names() {
        let m: PaymentMethod = serde_json::from_str("\"bank_transfer\"").unwrap();
        assert_eq!(m, PaymentMethod::BankTransfer);
        assert_eq!("online".parse::<PaymentMethod>().unwrap(), PaymentMethod::Online);
    }
}
