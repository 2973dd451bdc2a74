pub mod contact;
pub mod money;
pub mod pii;
pub mod models;

pub use contact::is_plausible_email;
pub use money::{amount_in_range, MAX_AMOUNT_CENTS};
pub use models::events::DomainEvent;
pub use models::paging::{Page, PageRequest};
pub use pii::Masked;
