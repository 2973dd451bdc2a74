use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tourdesk_core::identity::{hash_password, NewUser, Role};
use tourdesk_core::repository::{RepoResult, UserRepository};
use tracing::info;

use crate::app_config::{BootstrapAdmin, DatabaseConfig};
use crate::user_repo::PgUserRepository;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = Self::options(config).connect(&config.url).await?;
        Ok(Self { pool })
    }

    /// Pool that only dials the database on first use.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = Self::options(config).connect_lazy(&config.url)?;
        Ok(Self { pool })
    }

    fn options(config: &DatabaseConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Create the first admin when nobody can log in yet. Returns whether a user was created.
    pub async fn bootstrap_admin(&self, admin: &BootstrapAdmin, bcrypt_cost: u32) -> RepoResult<bool> {
        let users = PgUserRepository::new(self.pool.clone());
        if users.count_users().await? > 0 {
            return Ok(false);
        }

        let new_user = NewUser {
            name: admin.name.clone(),
            email: admin.email.clone(),
            password: admin.password.clone(),
            role: Role::Admin,
        };
        new_user.validate()?;
        let hash = hash_password(&new_user.password, bcrypt_cost)?;
        let user = users.create_user(&new_user, &hash).await?;
        info!("Bootstrap admin created: {}", user.email);
        Ok(true)
    }
}
