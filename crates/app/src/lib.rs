//! Wiring for the storefront order core.
//!
//! Loads configuration, installs tracing, and builds an [`OrderService`]
//! over a pooled PostgreSQL store. Request handling lives outside this
//! workspace; callers embed the service directly.

pub mod config;
pub mod error;
pub mod telemetry;

use order_store::PostgresStore;
use sales::OrderService;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use config::{Config, LogFormat};
pub use error::AppError;

/// Order service backed by PostgreSQL.
pub type PgOrderService = OrderService<PostgresStore>;

/// Pool options derived from the configuration.
pub fn pool_options(config: &Config) -> PgPoolOptions {
    PgPoolOptions::new().max_connections(config.max_connections)
}

/// Opens a connection pool.
#[tracing::instrument(skip(config), fields(max_connections = config.max_connections))]
pub async fn connect(config: &Config) -> Result<PgPool, AppError> {
    let pool = pool_options(config).connect(&config.database_url).await?;
    tracing::info!("database pool ready");
    Ok(pool)
}

/// Connects, applies pending migrations, and builds the order service.
pub async fn build_service(config: &Config) -> Result<PgOrderService, AppError> {
    let store = PostgresStore::new(connect(config).await?);
    store.run_migrations().await?;
    Ok(OrderService::new(store))
}
