use serde::{Deserialize, Serialize};

use crate::models::{BookingStatus, Payment, PaymentStatus};

/// Money position of a booking, shown on the booking detail page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingBalance {
    pub total_cents: i64,
    pub paid_cents: i64,
    pub refunded_cents: i64,
    pub balance_due_cents: i64,
    pub overpaid: bool,
}

impl BookingBalance {
    pub fn from_payments(total_cents: i64, payments: &[Payment]) -> Self {
        let paid: i64 = payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Completed)
            .map(|p| p.amount_cents)
            .sum();
        let refunded: i64 = payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Refunded)
            .map(|p| p.amount_cents)
            .sum();
        Self::new(total_cents, paid, refunded)
    }

    pub fn new(total_cents: i64, paid_cents: i64, refunded_cents: i64) -> Self {
        Self {
            total_cents,
            paid_cents,
            refunded_cents,
            balance_due_cents: (total_cents - paid_cents).max(0),
            overpaid: paid_cents > total_cents,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.paid_cents >= self.total_cents
    }
}

/// Status a booking should hold after its paid amount changed.
/// Fully paid pending bookings confirm; confirmed bookings that lose cover reopen.
/// Completed and cancelled bookings are never touched.
pub fn settle_status(current: BookingStatus, total_cents: i64, paid_cents: i64) -> BookingStatus {
    match current {
        BookingStatus::Pending if paid_cents >= total_cents => BookingStatus::Confirmed,
        BookingStatus::Confirmed if paid_cents < total_cents => BookingStatus::Pending,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentMethod;
    use chrono::Utc;
    use uuid::Uuid;

    fn payment(amount: i64, status: PaymentStatus) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            booking_id: Uuid::nil(),
            amount_cents: amount,
            method: PaymentMethod::Cash,
            status,
            reference: None,
            notes: None,
            paid_at: Utc::now(),
            refunded_at: None,
            recorded_by: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn balance_ignores_refunded_payments() {
        let payments = vec![
            payment(30_000, PaymentStatus::Completed),
            payment(10_000, PaymentStatus::Refunded),
            payment(5_000, PaymentStatus::Completed),
        ];
        let balance = BookingBalance::from_payments(50_000, &payments);
        assert_eq!(balance.paid_cents, 35_000);
        assert_eq!(balance.refunded_cents, 10_000);
        assert_eq!(balance.balance_due_cents, 15_000);
        assert!(!balance.overpaid);
        assert!(!balance.is_settled());
    }

    #[test]
    fn overpayment_is_flagged() {
        let balance = BookingBalance::new(20_000, 25_000, 0);
        assert_eq!(balance.balance_due_cents, 0);
        assert!(balance.overpaid);
        assert!(balance.is_settled());
    }

    #[test]
    fn full_payment_confirms() {
        assert_eq!(settle_status(BookingStatus::Pending, 20_000, 20_000), BookingStatus::Confirmed);
        assert_eq!(settle_status(BookingStatus::Pending, 20_000, 19_999), BookingStatus::Pending);
    }

    #[test]
    fn refund_reopens_confirmed_booking() {
        assert_eq!(settle_status(BookingStatus::Confirmed, 20_000, 5_000), BookingStatus::Pending);
        assert_eq!(settle_status(BookingStatus::Confirmed, 20_000, 20_000), BookingStatus::Confirmed);
    }

    #[test]
    fn terminal_bookings_are_untouched() {
        assert_eq!(settle_status(BookingStatus::Completed, 20_000, 0), BookingStatus::Completed);
        assert_eq!(settle_status(BookingStatus::Cancelled, 0, 50_000), BookingStatus::Cancelled);
    }
}
