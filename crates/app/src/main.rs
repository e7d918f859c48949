//! Applies the database migrations and exits.

use app::{AppError, Config};
use order_store::PostgresStore;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env();
    app::telemetry::init_tracing(&config);

    let pool = app::connect(&config).await?;
    let store = PostgresStore::new(pool);

    tracing::info!("running migrations");
    if let Err(e) = store.run_migrations().await {
        tracing::error!(error = %e, "migrations failed");
        return Err(e.into());
    }
    tracing::info!("migrations applied");

    store.pool().close().await;
    Ok(())
}
