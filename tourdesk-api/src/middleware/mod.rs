pub mod auth;
pub mod rate_limit;

pub use auth::{issue_token, require_admin, require_guide, require_login, require_operations, StaffClaims};
pub use rate_limit::login_rate_limit;
