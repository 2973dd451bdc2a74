use anyhow::Context;
use std::net::SocketAddr;
use tourdesk_api::{app, telemetry, AppState};
use tourdesk_store::{Config, DbClient, RedisClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Tourdesk API on port {}", config.server.port);

    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    if config.database.run_migrations {
        db.migrate().await.context("Failed to run migrations")?;
    }
    if let Some(admin) = &config.bootstrap {
        db.bootstrap_admin(admin, config.auth.bcrypt_cost)
            .await
            .context("Failed to create bootstrap admin")?;
    }

    let redis = RedisClient::new(&config.redis.url).context("Invalid Redis URL")?;
    let app_state = AppState::new(&config, &db, redis)?;
    let app = app(app_state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
