use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub bootstrap: Option<BootstrapAdmin>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// ISO 4217 code all `*_cents` amounts are in.
    pub currency: String,
    #[serde(default = "default_upcoming_window")]
    pub upcoming_window_days: i64,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_upcoming_window() -> i64 { 30 }
fn default_event_buffer() -> usize { 256 }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    #[serde(default = "default_login_attempts")]
    pub login_attempts_per_minute: i64,
}

fn default_bcrypt_cost() -> u32 { 12 }
fn default_login_attempts() -> i64 { 10 }

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

fn default_host() -> String { "0.0.0.0".into() }

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 { 10 }
fn default_acquire_timeout() -> u64 { 3 }
fn default_run_migrations() -> bool { true }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// First administrator, created on start-up when the users table is empty.
#[derive(Deserialize, Clone)]
pub struct BootstrapAdmin {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"********")
            .finish()
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, e.g. config/production.toml
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Developer overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // TOURDESK__AUTH__JWT_SECRET=... sets auth.jwt_secret
            .add_source(config::Environment::with_prefix("TOURDESK").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_settings_fall_back_to_defaults() {
        let raw = r#"
            [server]
            port = 8080
            [database]
            url = "postgres://localhost/tourdesk"
            [redis]
            url = "redis://localhost:6379"
            [auth]
            jwt_secret = "secret"
            jwt_expiration_seconds = 3600
            [business_rules]
            currency = "EUR"
        "#;
        let cfg: Config = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.database.max_connections, 10);
        assert!(cfg.database.run_migrations);
        assert_eq!(cfg.auth.bcrypt_cost, 12);
        assert_eq!(cfg.business_rules.upcoming_window_days, 30);
        assert!(cfg.bootstrap.is_none());
    }

    #[test]
    fn bootstrap_password_is_not_logged() {
        let admin = BootstrapAdmin {
            name: "Ops".into(),
            email: "ops@example.com".into(),
            password: "hunter2hunter2".into(),
        };
        assert!(!format!("{:?}", admin).contains("hunter2"));
    }
}
