use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Back-office events pushed to connected operators over the live event stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    BookingCreated {
        booking_id: Uuid,
        reference: String,
        tour_instance_id: Uuid,
        passenger_count: i32,
        total_cents: i64,
        at: DateTime<Utc>,
    },
    BookingStatusChanged {
        booking_id: Uuid,
        from: String,
        to: String,
        at: DateTime<Utc>,
    },
    PaymentRecorded {
        payment_id: Uuid,
        booking_id: Uuid,
        amount_cents: i64,
        method: String,
        at: DateTime<Utc>,
    },
    PaymentRefunded {
        payment_id: Uuid,
        booking_id: Uuid,
        amount_cents: i64,
        at: DateTime<Utc>,
    },
    InstanceScheduled {
        tour_instance_id: Uuid,
        template_id: Uuid,
        start_date: NaiveDate,
        at: DateTime<Utc>,
    },
    InstanceStatusChanged {
        tour_instance_id: Uuid,
        status: String,
        bookings_affected: u64,
        at: DateTime<Utc>,
    },
    AssignmentResponded {
        assignment_id: Uuid,
        guide_id: Uuid,
        status: String,
        at: DateTime<Utc>,
    },
    CheckInRecorded {
        check_in_id: Uuid,
        tour_instance_id: Uuid,
        waypoint: String,
        present: usize,
        absent: usize,
        at: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Event name used for the SSE `event:` field.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::BookingCreated { .. } => "booking_created",
            DomainEvent::BookingStatusChanged { .. } => "booking_status_changed",
            DomainEvent::PaymentRecorded { .. } => "payment_recorded",
            DomainEvent::PaymentRefunded { .. } => "payment_refunded",
            DomainEvent::InstanceScheduled { .. } => "instance_scheduled",
            DomainEvent::InstanceStatusChanged { .. } => "instance_status_changed",
            DomainEvent::AssignmentResponded { .. } => "assignment_responded",
            DomainEvent::CheckInRecorded { .. } => "check_in_recorded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_type() {
        let event = DomainEvent::BookingStatusChanged {
            booking_id: Uuid::nil(),
            from: "pending".into(),
            to: "confirmed".into(),
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.name());
        assert_eq!(json["to"], "confirmed");
    }
}
