use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{require_amount, require_text, CatalogError, CatalogResult};

pub const MAX_MARGIN: f64 = 5.0;
pub const MAX_DURATION_DAYS: i32 = 365;
pub const MAX_CAPACITY: i32 = 10_000;

/// A tour product line, e.g. "Cyclades Island Hopping". Templates hang off it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tour {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub destination: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TourInput {
    pub code: String,
    pub name: String,
    pub destination: String,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl TourInput {
    pub fn validate(&self) -> CatalogResult<()> {
        require_text("code", &self.code)?;
        require_text("name", &self.name)?;
        require_text("destination", &self.destination)?;
        if self.code.trim().len() > 32 {
            return Err(CatalogError::Validation("code must be at most 32 characters".into()));
        }
        Ok(())
    }

    /// Codes are stored upper-cased without surrounding whitespace.
    pub fn normalized_code(&self) -> String {
        self.code.trim().to_uppercase()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryDay {
    pub day: i32,
    pub title: String,
    pub description: Option<String>,
}

/// Reusable definition of a tour: itinerary and base pricing, no dates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TourTemplate {
    pub id: Uuid,
    pub tour_id: Uuid,
    pub title: String,
    pub duration_days: i32,
    pub itinerary: Vec<ItineraryDay>,
    pub base_price_cents: i64,
    pub default_capacity: i32,
    pub margin: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateInput {
    pub title: String,
    pub duration_days: i32,
    #[serde(default)]
    pub itinerary: Vec<ItineraryDay>,
    pub base_price_cents: i64,
    pub default_capacity: i32,
    #[serde(default)]
    pub margin: f64,
}

impl TemplateInput {
    pub fn validate(&self) -> CatalogResult<()> {
        require_text("title", &self.title)?;
        if !(1..=MAX_DURATION_DAYS).contains(&self.duration_days) {
            return Err(CatalogError::Validation(format!(
                "duration_days must be between 1 and {}",
                MAX_DURATION_DAYS
            )));
        }
        require_amount("base_price_cents", self.base_price_cents)?;
        if !(1..=MAX_CAPACITY).contains(&self.default_capacity) {
            return Err(CatalogError::Validation(format!(
                "default_capacity must be between 1 and {}",
                MAX_CAPACITY
            )));
        }
        if !(0.0..=MAX_MARGIN).contains(&self.margin) {
            return Err(CatalogError::Validation(format!(
                "margin must be between 0 and {}",
                MAX_MARGIN
            )));
        }

        let mut seen = HashSet::new();
        for entry in &self.itinerary {
            if entry.day < 1 || entry.day > self.duration_days {
                return Err(CatalogError::Validation(format!(
                    "itinerary day {} is outside the {}-day tour",
                    entry.day, self.duration_days
                )));
            }
            if !seen.insert(entry.day) {
                return Err(CatalogError::Validation(format!(
                    "itinerary day {} appears twice",
                    entry.day
                )));
            }
            require_text("itinerary title", &entry.title)?;
        }
        Ok(())
    }

    /// Itinerary ordered by day number.
    pub fn sorted_itinerary(&self) -> Vec<ItineraryDay> {
        let mut days = self.itinerary.clone();
        days.sort_by_key(|d| d.day);
        days
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Scheduled => "scheduled",
            InstanceStatus::Completed => "completed",
            InstanceStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, next: InstanceStatus) -> bool {
        matches!(
            (self, next),
            (InstanceStatus::Scheduled, InstanceStatus::Completed)
                | (InstanceStatus::Scheduled, InstanceStatus::Cancelled)
        )
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(InstanceStatus::Scheduled),
            "completed" => Ok(InstanceStatus::Completed),
            "cancelled" => Ok(InstanceStatus::Cancelled),
            other => Err(CatalogError::Validation(format!("unknown departure status '{}'", other))),
        }
    }
}

/// One scheduled departure of a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TourInstance {
    pub id: Uuid,
    pub template_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub capacity: i32,
    pub price_override_cents: Option<i64>,
    pub status: InstanceStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRequest {
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub capacity: Option<i32>,
    pub price_override_cents: Option<i64>,
    pub notes: Option<String>,
}

/// Partial update of a departure. `clear_price_override` drops back to the template price.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceChanges {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub capacity: Option<i32>,
    pub price_override_cents: Option<i64>,
    #[serde(default)]
    pub clear_price_override: bool,
    pub notes: Option<String>,
}

impl TourInstance {
    /// Split a dated departure off a template. Unspecified fields inherit from it.
    pub fn schedule(template: &TourTemplate, req: ScheduleRequest) -> CatalogResult<Self> {
        let end_date = match req.end_date {
            Some(end) => end,
            None => req
                .start_date
                .checked_add_signed(Duration::days(i64::from(template.duration_days) - 1))
                .ok_or_else(|| CatalogError::Validation("end_date is out of range".into()))?,
        };
        let now = Utc::now();
        let instance = Self {
            id: Uuid::new_v4(),
            template_id: template.id,
            start_date: req.start_date,
            end_date,
            capacity: req.capacity.unwrap_or(template.default_capacity),
            price_override_cents: req.price_override_cents,
            status: InstanceStatus::Scheduled,
            notes: req.notes,
            created_at: now,
            updated_at: now,
        };
        instance.validate()?;
        Ok(instance)
    }

    pub fn validate(&self) -> CatalogResult<()> {
        if self.end_date < self.start_date {
            return Err(CatalogError::Validation("end_date must not be before start_date".into()));
        }
        if !(1..=MAX_CAPACITY).contains(&self.capacity) {
            return Err(CatalogError::Validation(format!(
                "capacity must be between 1 and {}",
                MAX_CAPACITY
            )));
        }
        if let Some(price) = self.price_override_cents {
            require_amount("price_override_cents", price)?;
        }
        Ok(())
    }

    pub fn unit_price(&self, template: &TourTemplate) -> i64 {
        self.price_override_cents.unwrap_or(template.base_price_cents)
    }

    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    pub fn ensure_open(&self) -> CatalogResult<()> {
        if self.status != InstanceStatus::Scheduled {
            return Err(CatalogError::DepartureClosed(self.status.to_string()));
        }
        Ok(())
    }

    /// Apply an edit. Capacity may not drop below seats already sold.
    pub fn apply(&mut self, changes: InstanceChanges, booked_seats: i32) -> CatalogResult<()> {
        self.ensure_open()?;

        if let Some(start) = changes.start_date {
            self.start_date = start;
        }
        if let Some(end) = changes.end_date {
            self.end_date = end;
        }
        if let Some(capacity) = changes.capacity {
            if capacity < booked_seats {
                return Err(CatalogError::Validation(format!(
                    "capacity {} is below the {} seats already booked",
                    capacity, booked_seats
                )));
            }
            self.capacity = capacity;
        }
        if changes.clear_price_override {
            self.price_override_cents = None;
        } else if let Some(price) = changes.price_override_cents {
            self.price_override_cents = Some(price);
        }
        if let Some(notes) = changes.notes {
            self.notes = if notes.trim().is_empty() { None } else { Some(notes) };
        }

        self.validate()?;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn transition(&mut self, next: InstanceStatus) -> CatalogResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CatalogError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> TourTemplate {
        TourTemplate {
            id: Uuid::new_v4(),
            tour_id: Uuid::new_v4(),
            title: "Meteora & Delphi".into(),
            duration_days: 3,
            itinerary: vec![],
            base_price_cents: 45_000,
            default_capacity: 16,
            margin: 0.25,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn schedule_on(start: NaiveDate) -> ScheduleRequest {
        ScheduleRequest {
            start_date: start,
            end_date: None,
            capacity: None,
            price_override_cents: None,
            notes: None,
        }
    }

    #[test]
    fn schedule_inherits_from_template() {
        let tpl = template();
        let instance = TourInstance::schedule(&tpl, schedule_on(date(2026, 5, 10))).unwrap();

        assert_eq!(instance.template_id, tpl.id);
        assert_eq!(instance.end_date, date(2026, 5, 12));
        assert_eq!(instance.capacity, 16);
        assert_eq!(instance.status, InstanceStatus::Scheduled);
        assert_eq!(instance.unit_price(&tpl), 45_000);
        assert_eq!(instance.duration_days(), 3);
    }

    #[test]
    fn schedule_rejects_inverted_dates() {
        let tpl = template();
        let mut req = schedule_on(date(2026, 5, 10));
        req.end_date = Some(date(2026, 5, 9));
        assert!(matches!(
            TourInstance::schedule(&tpl, req),
            Err(CatalogError::Validation(_))
        ));
    }

    #[test]
    fn schedule_survives_dates_at_the_calendar_edge() {
        let mut tpl = template();
        tpl.duration_days = i32::MAX;
        assert!(matches!(
            TourInstance::schedule(&tpl, schedule_on(date(2026, 5, 10))),
            Err(CatalogError::Validation(_))
        ));

        tpl.duration_days = 3;
        assert!(matches!(
            TourInstance::schedule(&tpl, schedule_on(NaiveDate::MAX)),
            Err(CatalogError::Validation(_))
        ));
    }

    #[test]
    fn price_override_wins_and_can_be_cleared() {
        let tpl = template();
        let mut req = schedule_on(date(2026, 6, 1));
        req.price_override_cents = Some(39_900);
        let mut instance = TourInstance::schedule(&tpl, req).unwrap();
        assert_eq!(instance.unit_price(&tpl), 39_900);

        instance
            .apply(InstanceChanges { clear_price_override: true, ..Default::default() }, 0)
            .unwrap();
        assert_eq!(instance.unit_price(&tpl), 45_000);
    }

    #[test]
    fn capacity_cannot_drop_below_booked_seats() {
        let tpl = template();
        let mut instance = TourInstance::schedule(&tpl, schedule_on(date(2026, 6, 1))).unwrap();
        let err = instance
            .apply(InstanceChanges { capacity: Some(4), ..Default::default() }, 6)
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
        assert_eq!(instance.capacity, 16);

        instance
            .apply(InstanceChanges { capacity: Some(6), ..Default::default() }, 6)
            .unwrap();
        assert_eq!(instance.capacity, 6);
    }

    #[test]
    fn status_transitions() {
        let tpl = template();
        let mut instance = TourInstance::schedule(&tpl, schedule_on(date(2026, 6, 1))).unwrap();
        instance.transition(InstanceStatus::Cancelled).unwrap();

        assert!(matches!(
            instance.transition(InstanceStatus::Completed),
            Err(CatalogError::InvalidTransition { .. })
        ));
        assert!(matches!(
            instance.apply(InstanceChanges::default(), 0),
            Err(CatalogError::DepartureClosed(_))
        ));
    }

    #[test]
    fn template_itinerary_validation() {
        let mut input = TemplateInput {
            title: "Crete Highlights".into(),
            duration_days: 2,
            itinerary: vec![
                ItineraryDay { day: 2, title: "Knossos".into(), description: None },
                ItineraryDay { day: 1, title: "Heraklion".into(), description: None },
            ],
            base_price_cents: 30_000,
            default_capacity: 20,
            margin: 0.2,
        };
        input.validate().unwrap();
        assert_eq!(input.sorted_itinerary()[0].title, "Heraklion");

        input.itinerary.push(ItineraryDay { day: 3, title: "Extra".into(), description: None });
        assert!(input.validate().is_err());

        input.itinerary.pop();
        input.itinerary.push(ItineraryDay { day: 2, title: "Twice".into(), description: None });
        assert!(input.validate().is_err());
    }

    #[test]
    fn template_figures_are_bounded() {
        let mut input = TemplateInput {
            title: "Ionian Sailing".into(),
            duration_days: MAX_DURATION_DAYS,
            itinerary: vec![],
            base_price_cents: tourdesk_shared::MAX_AMOUNT_CENTS,
            default_capacity: MAX_CAPACITY,
            margin: 0.3,
        };
        input.validate().unwrap();

        input.duration_days = i32::MAX;
        assert!(input.validate().is_err());

        input.duration_days = 7;
        input.base_price_cents = i64::MAX / 4;
        assert!(input.validate().is_err());

        input.base_price_cents = 90_000;
        input.default_capacity = MAX_CAPACITY + 1;
        assert!(input.validate().is_err());
    }

    #[test]
    fn departure_figures_are_bounded() {
        let tpl = template();
        let mut req = schedule_on(date(2026, 7, 1));
        req.price_override_cents = Some(tourdesk_shared::MAX_AMOUNT_CENTS + 1);
        assert!(TourInstance::schedule(&tpl, req).is_err());

        let mut instance = TourInstance::schedule(&tpl, schedule_on(date(2026, 7, 1))).unwrap();
        assert!(instance
            .apply(InstanceChanges { capacity: Some(i32::MAX), ..Default::default() }, 0)
            .is_err());
    }

    #[test]
    fn tour_code_is_normalized() {
        let input = TourInput {
            code: " cyc-07 ".into(),
            name: "Cyclades".into(),
            destination: "Greece".into(),
            description: None,
            is_active: true,
        };
        input.validate().unwrap();
        assert_eq!(input.normalized_code(), "CYC-07");
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [InstanceStatus::Scheduled, InstanceStatus::Completed, InstanceStatus::Cancelled] {
            assert_eq!(status.as_str().parse::<InstanceStatus>().unwrap(), status);
        }
        assert!("delayed".parse::<InstanceStatus>().is_err());
    }
}
