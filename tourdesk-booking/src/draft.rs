use chrono::NaiveDate;
use serde::Deserialize;
use tourdesk_shared::{amount_in_range, is_plausible_email, Masked, MAX_AMOUNT_CENTS};
use uuid::Uuid;

use crate::models::{PassengerInput, PaymentMethod};
use crate::{BookingError, BookingResult};

#[derive(Debug, Clone, Deserialize)]
pub struct InitialPayment {
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

/// Everything the booking form submits in one go.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingDraft {
    pub tour_instance_id: Uuid,
    pub customer_name: String,
    pub customer_email: Masked<String>,
    pub customer_phone: Option<Masked<String>>,
    pub passenger_count: i32,
    #[serde(default)]
    pub passengers: Vec<PassengerInput>,
    pub notes: Option<String>,
    pub initial_payment: Option<InitialPayment>,
}

impl BookingDraft {
    pub fn validate(&self) -> BookingResult<()> {
        if self.customer_name.trim().is_empty() {
            return Err(BookingError::Validation("customer_name must not be empty".into()));
        }
        if !is_plausible_email(self.customer_email.expose()) {
            return Err(BookingError::Validation("customer_email is not a valid email".into()));
        }
        if self.passenger_count < 1 {
            return Err(BookingError::Validation("passenger_count must be at least 1".into()));
        }
        if self.passengers.len() != self.passenger_count as usize {
            return Err(BookingError::Validation(format!(
                "passenger_count is {} but {} passengers were given",
                self.passenger_count,
                self.passengers.len()
            )));
        }
        for passenger in &self.passengers {
            passenger.validate()?;
        }
        if self.passengers.iter().filter(|p| p.is_lead).count() > 1 {
            return Err(BookingError::Validation("only one passenger can be the lead".into()));
        }
        if let Some(payment) = &self.initial_payment {
            if payment.amount_cents <= 0 || !amount_in_range(payment.amount_cents) {
                return Err(BookingError::Validation(format!(
                    "initial payment amount must be between 1 and {}",
                    MAX_AMOUNT_CENTS
                )));
            }
        }
        Ok(())
    }

    /// The first passenger leads when nobody was picked.
    pub fn assign_lead(&mut self) {
        if !self.passengers.iter().any(|p| p.is_lead) {
            if let Some(first) = self.passengers.first_mut() {
                first.is_lead = true;
            }
        }
    }

    pub fn price(&self, unit_price_cents: i64) -> BookingResult<i64> {
        crate::models::line_total(unit_price_cents, self.passenger_count)
    }
}

/// Human-friendly reference printed on vouchers: `TD-YYMMDD-XXXXXX`.
pub fn booking_reference(id: Uuid, date: NaiveDate) -> String {
    let hex = id.simple().to_string().to_uppercase();
    format!("TD-{}-{}", date.format("%y%m%d"), &hex[..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passenger(first: &str, lead: bool) -> PassengerInput {
        PassengerInput {
            first_name: first.into(),
            last_name: "Georgiou".into(),
            date_of_birth: None,
            document_number: None,
            nationality: Some("GR".into()),
            is_lead: lead,
        }
    }

    fn draft(passengers: Vec<PassengerInput>) -> BookingDraft {
        BookingDraft {
            tour_instance_id: Uuid::new_v4(),
            customer_name: "Maria Georgiou".into(),
            customer_email: Masked::from("maria@example.com"),
            customer_phone: None,
            passenger_count: passengers.len() as i32,
            passengers,
            notes: None,
            initial_payment: None,
        }
    }

    #[test]
    fn valid_draft_gets_a_lead() {
        let mut d = draft(vec![passenger("Maria", false), passenger("Kostas", false)]);
        d.validate().unwrap();
        d.assign_lead();
        assert!(d.passengers[0].is_lead);
        assert!(!d.passengers[1].is_lead);
        assert_eq!(d.price(12_500), Ok(25_000));
    }

    #[test]
    fn passenger_list_must_match_count() {
        let mut d = draft(vec![passenger("Maria", false)]);
        d.passenger_count = 2;
        assert!(matches!(d.validate(), Err(BookingError::Validation(_))));
    }

    #[test]
    fn zero_passengers_rejected() {
        let d = draft(vec![]);
        assert!(d.validate().is_err());
    }

    #[test]
    fn two_leads_rejected() {
        let d = draft(vec![passenger("Maria", true), passenger("Kostas", true)]);
        assert!(d.validate().is_err());
    }

    #[test]
    fn bad_email_and_payment_rejected() {
        let mut d = draft(vec![passenger("Maria", false)]);
        d.customer_email = Masked::from("maria-at-example");
        assert!(d.validate().is_err());

        let mut d = draft(vec![passenger("Maria", false)]);
        d.initial_payment = Some(InitialPayment {
            amount_cents: 0,
            method: PaymentMethod::Cash,
            reference: None,
        });
        assert!(d.validate().is_err());
    }

    #[test]
    fn oversized_amounts_are_rejected() {
        let d = draft(vec![passenger("Maria", false), passenger("Kostas", false)]);
        assert!(matches!(d.price(i64::MAX / 2 + 1), Err(BookingError::Validation(_))));

        let mut d = draft(vec![passenger("Maria", false)]);
        d.initial_payment = Some(InitialPayment {
            amount_cents: MAX_AMOUNT_CENTS + 1,
            method: PaymentMethod::Card,
            reference: None,
        });
        assert!(d.validate().is_err());
    }

    #[test]
    fn reference_format() {
        let id = Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000000").unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(booking_reference(id, date), "TD-261019-A1B2C3");
    }
}
