use std::sync::Arc;
use tokio::sync::broadcast;
use tourdesk_core::identity::hash_password;
use tourdesk_core::repository::{
    BookingRepository, EmployeeRepository, FieldRepository, ProviderRepository, ReportRepository,
    TourRepository, UserRepository,
};
use tourdesk_shared::DomainEvent;
use tourdesk_store::app_config::{BusinessRules, Config};
use tourdesk_store::{
    DbClient, PgBookingRepository, PgEmployeeRepository, PgFieldRepository, PgProviderRepository,
    PgReportRepository, PgTourRepository, PgUserRepository, RedisClient,
};
use uuid::Uuid;

use crate::telemetry::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
    pub bcrypt_cost: u32,
    pub login_attempts_per_minute: i64,
    /// Hash at the configured cost, verified against when a login email is unknown.
    pub decoy_hash: String,
}

#[derive(Clone)]
pub struct AppState {
    pub redis: Arc<RedisClient>,
    pub users: Arc<dyn UserRepository>,
    pub employees: Arc<dyn EmployeeRepository>,
    pub providers: Arc<dyn ProviderRepository>,
    pub tours: Arc<dyn TourRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub field: Arc<dyn FieldRepository>,
    pub reports: Arc<dyn ReportRepository>,
    pub sse_tx: broadcast::Sender<DomainEvent>,
    pub metrics: Arc<Metrics>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

impl AppState {
    pub fn new(config: &Config, db: &DbClient, redis: RedisClient) -> anyhow::Result<Self> {
        let (sse_tx, _) = broadcast::channel(config.business_rules.event_buffer.max(1));
        let pool = db.pool.clone();

        Ok(Self {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            employees: Arc::new(PgEmployeeRepository::new(pool.clone())),
            providers: Arc::new(PgProviderRepository::new(pool.clone())),
            tours: Arc::new(PgTourRepository::new(pool.clone())),
            bookings: Arc::new(PgBookingRepository::new(pool.clone())),
            field: Arc::new(PgFieldRepository::new(pool.clone())),
            reports: Arc::new(PgReportRepository::new(pool)),
            redis: Arc::new(redis),
            sse_tx,
            metrics: Arc::new(Metrics::new()?),
            auth: AuthConfig {
                secret: config.auth.jwt_secret.clone(),
                expiration: config.auth.jwt_expiration_seconds,
                bcrypt_cost: config.auth.bcrypt_cost,
                login_attempts_per_minute: config.auth.login_attempts_per_minute,
                decoy_hash: hash_password(&Uuid::new_v4().to_string(), config.auth.bcrypt_cost)?,
            },
            business_rules: config.business_rules.clone(),
        })
    }

    /// Fan an event out to live subscribers. Nobody listening is not an error.
    pub fn publish(&self, event: DomainEvent) {
        tracing::debug!("Publishing {} event", event.name());
        let _ = self.sse_tx.send(event);
    }
}
