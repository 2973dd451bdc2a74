pub mod models;
pub mod manager;
pub mod draft;
pub mod finance;

pub use models::{
    Booking, BookingStatus, Passenger, PassengerInput, Payment, PaymentMethod, PaymentStatus,
};
pub use draft::{booking_reference, BookingDraft, InitialPayment};
pub use finance::{settle_status, BookingBalance};
pub use manager::{transition, TransitionSource};

/// Booking and payment rule violations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BookingError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid booking status transition from {from} to {to}")]
    InvalidTransition {
        from: String,
        to: String,
    },

    #[error("Booking is {0} and no longer accepts payments")]
    NotPayable(String),

    #[error("Payment is {0} and cannot be refunded")]
    NotRefundable(String),
}

pub type BookingResult<T> = Result<T, BookingError>;
