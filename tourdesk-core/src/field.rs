use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tourdesk_booking::BookingStatus;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

pub const MAX_NOTE_LEN: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    pub passenger_id: Uuid,
    pub present: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckInInput {
    pub waypoint: String,
    pub notes: Option<String>,
    pub checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attendance: Vec<AttendanceEntry>,
}

impl CheckInInput {
    /// `manifest` holds the passengers currently travelling on the departure.
    pub fn validate(&self, manifest: &HashSet<Uuid>) -> CoreResult<()> {
        if self.waypoint.trim().is_empty() {
            return Err(CoreError::ValidationError("waypoint must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for entry in &self.attendance {
            if !manifest.contains(&entry.passenger_id) {
                return Err(CoreError::ValidationError(format!(
                    "passenger {} is not on this departure",
                    entry.passenger_id
                )));
            }
            if !seen.insert(entry.passenger_id) {
                return Err(CoreError::ValidationError(format!(
                    "passenger {} is listed twice",
                    entry.passenger_id
                )));
            }
        }
        Ok(())
    }
}

/// Attendance taken by a guide at one stop of the trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckIn {
    pub id: Uuid,
    pub tour_instance_id: Uuid,
    pub assignment_id: Uuid,
    pub guide_id: Uuid,
    pub waypoint: String,
    pub notes: Option<String>,
    pub checked_at: DateTime<Utc>,
    pub attendance: Vec<AttendanceEntry>,
    pub created_at: DateTime<Utc>,
}

impl CheckIn {
    pub fn present_count(&self) -> usize {
        self.attendance.iter().filter(|a| a.present).count()
    }

    pub fn absent_count(&self) -> usize {
        self.attendance.len() - self.present_count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteCategory {
    #[default]
    General,
    Incident,
    Feedback,
}

impl NoteCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteCategory::General => "general",
            NoteCategory::Incident => "incident",
            NoteCategory::Feedback => "feedback",
        }
    }
}

impl fmt::Display for NoteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(NoteCategory::General),
            "incident" => Ok(NoteCategory::Incident),
            "feedback" => Ok(NoteCategory::Feedback),
            other => Err(CoreError::ValidationError(format!("unknown note category '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripNote {
    pub id: Uuid,
    pub tour_instance_id: Uuid,
    pub assignment_id: Uuid,
    pub author_id: Uuid,
    pub category: NoteCategory,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TripNoteInput {
    #[serde(default)]
    pub category: NoteCategory,
    pub body: String,
}

impl TripNoteInput {
    pub fn validate(&self) -> CoreResult<()> {
        if self.body.trim().is_empty() {
            return Err(CoreError::ValidationError("note body must not be empty".into()));
        }
        if self.body.chars().count() > MAX_NOTE_LEN {
            return Err(CoreError::ValidationError(format!(
                "note body must be at most {} characters",
                MAX_NOTE_LEN
            )));
        }
        Ok(())
    }
}

/// One line of the passenger manifest a guide carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub passenger_id: Uuid,
    pub booking_id: Uuid,
    pub booking_reference: String,
    pub booking_status: BookingStatus,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub is_lead: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_in_attendance_must_match_manifest() {
        let (a, b, stranger) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let manifest: HashSet<Uuid> = [a, b].into_iter().collect();

        let mut input = CheckInInput {
            waypoint: "Delphi museum entrance".into(),
            notes: None,
            checked_at: None,
            attendance: vec![
                AttendanceEntry { passenger_id: a, present: true },
                AttendanceEntry { passenger_id: b, present: false },
            ],
        };
        input.validate(&manifest).unwrap();

        input.attendance.push(AttendanceEntry { passenger_id: stranger, present: true });
        assert!(input.validate(&manifest).is_err());

        input.attendance.pop();
        input.attendance.push(AttendanceEntry { passenger_id: a, present: false });
        assert!(input.validate(&manifest).is_err());
    }

    #[test]
    fn check_in_counts() {
        let check_in = CheckIn {
            id: Uuid::new_v4(),
            tour_instance_id: Uuid::new_v4(),
            assignment_id: Uuid::new_v4(),
            guide_id: Uuid::new_v4(),
            waypoint: "Hotel lobby".into(),
            notes: None,
            checked_at: Utc::now(),
            attendance: vec![
                AttendanceEntry { passenger_id: Uuid::new_v4(), present: true },
                AttendanceEntry { passenger_id: Uuid::new_v4(), present: true },
                AttendanceEntry { passenger_id: Uuid::new_v4(), present: false },
            ],
            created_at: Utc::now(),
        };
        assert_eq!(check_in.present_count(), 2);
        assert_eq!(check_in.absent_count(), 1);
    }

    #[test]
    fn notes_need_a_body() {
        assert!(TripNoteInput { category: NoteCategory::Incident, body: "  ".into() }
            .validate()
            .is_err());
        assert!(TripNoteInput { category: NoteCategory::General, body: "x".repeat(MAX_NOTE_LEN + 1) }
            .validate()
            .is_err());

        let input: TripNoteInput = serde_json::from_str(r#"{"body": "Ferry delayed 40 minutes"}"#).unwrap();
        assert_eq!(input.category, NoteCategory::General);
        input.validate().unwrap();
    }
}
