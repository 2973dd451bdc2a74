pub mod tour;
pub mod provider;
pub mod pricing;
pub mod inventory;

pub use tour::{
    InstanceChanges, InstanceStatus, ItineraryDay, ScheduleRequest, TemplateInput, Tour,
    TourInput, TourInstance, TourTemplate, MAX_CAPACITY, MAX_DURATION_DAYS,
};
pub use provider::{PricingUnit, Provider, ProviderInput, ProviderType, Service, ServiceInput};
pub use pricing::{estimate, EstimateLine, PricingEstimate};
pub use inventory::{ensure_capacity, seats_available};

/// Catalog rule violations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid departure status transition from {from} to {to}")]
    InvalidTransition {
        from: String,
        to: String,
    },

    #[error("Not enough seats: {requested} requested, {available} available")]
    InsufficientCapacity {
        requested: i32,
        available: i32,
    },

    #[error("Departure is {0}; only scheduled departures accept changes")]
    DepartureClosed(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

pub(crate) fn require_amount(field: &str, cents: i64) -> CatalogResult<()> {
    if !tourdesk_shared::amount_in_range(cents) {
        return Err(CatalogError::Validation(format!(
            "{} must be between 0 and {}",
            field,
            tourdesk_shared::MAX_AMOUNT_CENTS
        )));
    }
    Ok(())
}

pub(crate) fn require_text(field: &str, value: &str) -> CatalogResult<()> {
    if value.trim().is_empty() {
        return Err(CatalogError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}
