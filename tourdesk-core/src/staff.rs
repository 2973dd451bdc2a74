use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tourdesk_shared::is_plausible_email;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// HR record for office staff and guides. Linking to a user is optional;
/// drivers and seasonal staff often have no login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub position: String,
    pub department: Option<String>,
    pub hire_date: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmployeeInput {
    pub user_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub position: String,
    pub department: Option<String>,
    pub hire_date: Option<NaiveDate>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl EmployeeInput {
    pub fn validate(&self) -> CoreResult<()> {
        for (field, value) in [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("position", &self.position),
        ] {
            if value.trim().is_empty() {
                return Err(CoreError::ValidationError(format!("{} must not be empty", field)));
            }
        }
        if !is_plausible_email(&self.email) {
            return Err(CoreError::ValidationError(format!("'{}' is not a valid email", self.email)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn employee_requires_names_and_email() {
        let mut input = EmployeeInput {
            user_id: None,
            first_name: "Sofia".into(),
            last_name: "Alexiou".into(),
            email: "sofia@tourdesk.example".into(),
            phone: None,
            position: "Reservations agent".into(),
            department: Some("Sales".into()),
            hire_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            is_active: true,
        };
        input.validate().unwrap();

        input.position = " ".into();
        assert!(input.validate().is_err());

        input.position = "Agent".into();
        input.email = "sofia".into();
        assert!(input.validate().is_err());
    }
}
