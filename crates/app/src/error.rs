//! Startup error types.

use order_store::StoreError;
use thiserror::Error;

/// Errors that can occur while bootstrapping the order core.
#[derive(Debug, Error)]
pub enum AppError {
    /// The database could not be reached.
    #[error("Failed to connect to database: {0}")]
    Connect(#[from] sqlx::Error),

    /// Migrations or another store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
