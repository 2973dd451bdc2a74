use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tourdesk_shared::is_plausible_email;
use uuid::Uuid;

use crate::{require_amount, require_text, CatalogError, CatalogResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    Hotel,
    Transport,
    Restaurant,
    Activity,
    GuideAgency,
    Other,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Hotel => "hotel",
            ProviderType::Transport => "transport",
            ProviderType::Restaurant => "restaurant",
            ProviderType::Activity => "activity",
            ProviderType::GuideAgency => "guide_agency",
            ProviderType::Other => "other",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hotel" => Ok(ProviderType::Hotel),
            "transport" => Ok(ProviderType::Transport),
            "restaurant" => Ok(ProviderType::Restaurant),
            "activity" => Ok(ProviderType::Activity),
            "guide_agency" => Ok(ProviderType::GuideAgency),
            "other" => Ok(ProviderType::Other),
            other => Err(CatalogError::Validation(format!("unknown provider type '{}'", other))),
        }
    }
}

/// A supplier the operator buys services from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    pub name: String,
    pub provider_type: ProviderType,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderInput {
    pub name: String,
    pub provider_type: ProviderType,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl ProviderInput {
    pub fn validate(&self) -> CatalogResult<()> {
        require_text("name", &self.name)?;
        if let Some(email) = self.email.as_deref().filter(|e| !e.trim().is_empty()) {
            if !is_plausible_email(email) {
                return Err(CatalogError::Validation(format!("'{}' is not a valid email", email)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingUnit {
    PerPerson,
    PerGroup,
    PerDay,
}

impl PricingUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingUnit::PerPerson => "per_person",
            PricingUnit::PerGroup => "per_group",
            PricingUnit::PerDay => "per_day",
        }
    }
}

impl fmt::Display for PricingUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PricingUnit {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per_person" => Ok(PricingUnit::PerPerson),
            "per_group" => Ok(PricingUnit::PerGroup),
            "per_day" => Ok(PricingUnit::PerDay),
            other => Err(CatalogError::Validation(format!("unknown pricing unit '{}'", other))),
        }
    }
}

/// Something a provider sells: a hotel night, a coach transfer, a museum ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub unit_price_cents: i64,
    pub pricing_unit: PricingUnit,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceInput {
    pub name: String,
    pub description: Option<String>,
    pub unit_price_cents: i64,
    pub pricing_unit: PricingUnit,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl ServiceInput {
    pub fn validate(&self) -> CatalogResult<()> {
        require_text("name", &self.name)?;
        require_amount("unit_price_cents", self.unit_price_cents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_input() -> ProviderInput {
        ProviderInput {
            name: "Aegean Coaches".into(),
            provider_type: ProviderType::Transport,
            contact_name: Some("Nikos".into()),
            email: Some("dispatch@aegean-coaches.gr".into()),
            phone: None,
            address: None,
            notes: None,
            is_active: true,
        }
    }

    #[test]
    fn provider_email_is_checked_when_present() {
        let mut input = provider_input();
        input.validate().unwrap();

        input.email = Some("not-an-email".into());
        assert!(input.validate().is_err());

        input.email = Some("   ".into());
        input.validate().unwrap();
    }

    #[test]
    fn provider_type_parses_from_wire_form() {
        assert_eq!("guide_agency".parse::<ProviderType>().unwrap(), ProviderType::GuideAgency);
        let parsed: ProviderType = serde_json::from_str("\"guide_agency\"").unwrap();
        assert_eq!(parsed, ProviderType::GuideAgency);
    }

    #[test]
    fn service_price_must_be_in_range() {
        let mut input = ServiceInput {
            name: "Ferry ticket".into(),
            description: None,
            unit_price_cents: -1,
            pricing_unit: PricingUnit::PerPerson,
            is_active: true,
        };
        assert!(input.validate().is_err());

        input.unit_price_cents = i64::MAX / 4;
        assert!(input.validate().is_err());

        input.unit_price_cents = 4_500;
        input.validate().unwrap();
    }
}
