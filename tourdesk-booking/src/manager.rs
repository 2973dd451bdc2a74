use chrono::Utc;

use crate::models::{Booking, BookingStatus};
use crate::{BookingError, BookingResult};

/// Who is asking for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionSource {
    /// An operator using the booking screen.
    Operator,
    /// The balance settlement after a payment was recorded, refunded or removed.
    Payment,
}

impl BookingStatus {
    /// Lifecycle edges:
    /// pending -> confirmed | cancelled,
    /// confirmed -> completed | cancelled | pending,
    /// completed and cancelled are terminal.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, Cancelled)
                | (Confirmed, Pending)
        )
    }
}

/// Move a booking to `next`, returning the previous status.
/// Operators cannot push a booking back to pending; only settlement does that.
pub fn transition(
    booking: &mut Booking,
    next: BookingStatus,
    source: TransitionSource,
) -> BookingResult<BookingStatus> {
    let current = booking.status;
    let allowed = current.can_transition_to(next)
        && !(source == TransitionSource::Operator && next == BookingStatus::Pending);

    if !allowed {
        return Err(BookingError::InvalidTransition {
            from: current.to_string(),
            to: next.to_string(),
        });
    }

    booking.status = next;
    booking.updated_at = Utc::now();
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tourdesk_shared::Masked;
    use uuid::Uuid;

    fn booking(status: BookingStatus) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            reference: "TD-260501-ABCDEF".into(),
            tour_instance_id: Uuid::new_v4(),
            customer_name: "Eleni Papadopoulou".into(),
            customer_email: Masked::from("eleni@example.com"),
            customer_phone: None,
            passenger_count: 2,
            unit_price_cents: 10_000,
            total_cents: 20_000,
            status,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn booking_lifecycle() {
        let mut b = booking(BookingStatus::Pending);

        transition(&mut b, BookingStatus::Confirmed, TransitionSource::Operator).unwrap();
        assert_eq!(b.status, BookingStatus::Confirmed);

        let previous = transition(&mut b, BookingStatus::Completed, TransitionSource::Operator).unwrap();
        assert_eq!(previous, BookingStatus::Confirmed);
        assert_eq!(b.status, BookingStatus::Completed);
    }

    #[test]
    fn terminal_states_stay_terminal() {
        for terminal in [BookingStatus::Completed, BookingStatus::Cancelled] {
            for next in [
                BookingStatus::Pending,
                BookingStatus::Confirmed,
                BookingStatus::Completed,
                BookingStatus::Cancelled,
            ] {
                let mut b = booking(terminal);
                assert!(transition(&mut b, next, TransitionSource::Payment).is_err());
            }
        }
    }

    #[test]
    fn only_settlement_reopens_a_confirmed_booking() {
        let mut b = booking(BookingStatus::Confirmed);
        assert!(matches!(
            transition(&mut b, BookingStatus::Pending, TransitionSource::Operator),
            Err(BookingError::InvalidTransition { .. })
        ));

        transition(&mut b, BookingStatus::Pending, TransitionSource::Payment).unwrap();
        assert_eq!(b.status, BookingStatus::Pending);
    }

    #[test]
    fn pending_cannot_skip_to_completed() {
        let mut b = booking(BookingStatus::Pending);
        assert!(transition(&mut b, BookingStatus::Completed, TransitionSource::Operator).is_err());
    }
}
