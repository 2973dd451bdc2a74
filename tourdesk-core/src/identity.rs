use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tourdesk_shared::is_plausible_email;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Guide,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Guide => "guide",
        }
    }

    /// Users and employees screens.
    pub fn can_manage_staff(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Tours, providers, bookings, payments and guide assignments.
    pub fn can_manage_operations(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }

    pub fn is_guide(&self) -> bool {
        matches!(self, Role::Guide)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "guide" => Ok(Role::Guide),
            other => Err(CoreError::ValidationError(format!("unknown role '{}'", other))),
        }
    }
}

/// A back-office login. The password hash never leaves the store layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

impl NewUser {
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ValidationError("name must not be empty".into()));
        }
        validate_email(&self.email)?;
        validate_password(&self.password)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

impl UserUpdate {
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(CoreError::ValidationError("name must not be empty".into()));
            }
        }
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        if let Some(password) = &self.password {
            validate_password(password)?;
        }
        Ok(())
    }

    /// Whether applying this update to `user` takes away an active admin.
    pub fn removes_admin(&self, user: &User) -> bool {
        let is_admin_now = user.role == Role::Admin && user.is_active;
        let stays_admin = self.role.unwrap_or(user.role) == Role::Admin
            && self.is_active.unwrap_or(user.is_active);
        is_admin_now && !stays_admin
    }
}

fn validate_email(email: &str) -> CoreResult<()> {
    if !is_plausible_email(email) {
        return Err(CoreError::ValidationError(format!("'{}' is not a valid email", email)));
    }
    Ok(())
}

fn validate_password(password: &str) -> CoreResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CoreError::ValidationError(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Emails are compared case-insensitively.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn hash_password(password: &str, cost: u32) -> CoreResult<String> {
    bcrypt::hash(password, cost).map_err(|e| CoreError::InternalError(format!("password hashing failed: {}", e)))
}

/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    bcrypt::verify(password, password_hash).unwrap_or(false)
}

/// Refuse to leave the system without an active administrator.
pub fn ensure_admin_remains(active_admins: i64) -> CoreResult<()> {
    if active_admins <= 1 {
        return Err(CoreError::Forbidden("the last active admin cannot be removed".into()));
    }
    Ok(())
}

/// Decide whether a login attempt succeeds, given what the store found for the email.
/// Unknown emails are checked against `decoy_hash` so both paths pay for one bcrypt run.
pub fn authenticate(found: Option<(User, String)>, password: &str, decoy_hash: &str) -> CoreResult<User> {
    let Some((user, hash)) = found else {
        verify_password(password, decoy_hash);
        return Err(CoreError::IdentityError("invalid email or password".into()));
    };
    if !verify_password(password, &hash) {
        return Err(CoreError::IdentityError("invalid email or password".into()));
    }
    if !user.is_active {
        tracing::warn!("Login attempt on disabled account {}", user.id);
        return Err(CoreError::IdentityError("account is disabled".into()));
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, active: bool) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Dimitra".into(),
            email: "dimitra@tourdesk.example".into(),
            role,
            is_active: active,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn roles_gate_capabilities() {
        assert!(Role::Admin.can_manage_staff());
        assert!(!Role::Manager.can_manage_staff());
        assert!(Role::Manager.can_manage_operations());
        assert!(!Role::Guide.can_manage_operations());
        assert!(Role::Guide.is_guide());
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("s3cret-pass", 4).unwrap();
        assert!(verify_password("s3cret-pass", &hash));
        assert!(!verify_password("wrong-pass", &hash));
        assert!(!verify_password("s3cret-pass", "not-a-hash"));
    }

    #[test]
    fn authenticate_checks_password_and_activity() {
        let hash = hash_password("correct-horse", 4).unwrap();

        let decoy = hash_password("decoy", 4).unwrap();

        let ok = authenticate(Some((user(Role::Manager, true), hash.clone())), "correct-horse", &decoy);
        assert!(ok.is_ok());

        let wrong = authenticate(Some((user(Role::Manager, true), hash.clone())), "battery-staple", &decoy);
        assert!(matches!(wrong, Err(CoreError::IdentityError(_))));

        let disabled = authenticate(Some((user(Role::Manager, false), hash)), "correct-horse", &decoy);
        assert!(matches!(disabled, Err(CoreError::IdentityError(_))));

        assert!(authenticate(None, "anything", &decoy).is_err());
    }

    #[test]
    fn unknown_emails_never_sign_in() {
        let decoy = hash_password("decoy", 4).unwrap();
        // Even the decoy's own password gets nowhere without an account.
        assert!(matches!(
            authenticate(None, "decoy", &decoy),
            Err(CoreError::IdentityError(_))
        ));
        assert!(authenticate(None, "decoy", "not-a-hash").is_err());
    }

    #[test]
    fn new_user_validation() {
        let mut input = NewUser {
            name: "Yannis".into(),
            email: "yannis@tourdesk.example".into(),
            password: "longenough".into(),
            role: Role::Guide,
        };
        input.validate().unwrap();

        input.password = "short".into();
        assert!(input.validate().is_err());
    }

    #[test]
    fn detects_admin_removal() {
        let admin = user(Role::Admin, true);
        assert!(UserUpdate { role: Some(Role::Manager), ..Default::default() }.removes_admin(&admin));
        assert!(UserUpdate { is_active: Some(false), ..Default::default() }.removes_admin(&admin));
        assert!(!UserUpdate { name: Some("New".into()), ..Default::default() }.removes_admin(&admin));
        assert!(!UserUpdate { role: Some(Role::Guide), ..Default::default() }
            .removes_admin(&user(Role::Manager, true)));
    }

    #[test]
    fn last_admin_is_protected() {
        assert!(ensure_admin_remains(1).is_err());
        ensure_admin_remains(2).unwrap();
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Ops@TourDesk.Example "), "ops@tourdesk.example");
    }
}
