pub mod app_config;
pub mod database;
pub mod redis_repo;
mod rows;
pub mod user_repo;
pub mod staff_repo;
pub mod provider_repo;
pub mod tour_repo;
pub mod booking_repo;
pub mod field_repo;
pub mod report_repo;

pub use app_config::Config;
pub use database::DbClient;
pub use redis_repo::RedisClient;
pub use user_repo::PgUserRepository;
pub use staff_repo::PgEmployeeRepository;
pub use provider_repo::PgProviderRepository;
pub use tour_repo::PgTourRepository;
pub use booking_repo::PgBookingRepository;
pub use field_repo::PgFieldRepository;
pub use report_repo::PgReportRepository;
