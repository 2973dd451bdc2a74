pub mod identity;
pub mod staff;
pub mod assignment;
pub mod field;
pub mod views;
pub mod repository;

use tourdesk_booking::BookingError;
use tourdesk_catalog::CatalogError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Booking(#[from] BookingError),
    #[error("Invalid assignment transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Not allowed: {0}")]
    Forbidden(String),
    #[error("Identity verification failed: {0}")]
    IdentityError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
