use domain::{OrderId, OrderStatus, ProductId, StockShortfall};
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional stock decrement found less stock than requested.
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    /// A status write found the order in a different status than expected.
    #[error(
        "Status conflict for order {order_id}: expected {expected}, found {actual}"
    )]
    StatusConflict {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// A cancellation tried to restock an order whose reservation was
    /// already released.
    #[error("Reservation already released for order {0}")]
    ReservationReleased(OrderId),

    /// The order was not found in the store.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The product was not found in the catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// An order with this ID was already saved.
    #[error("Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// The write was rejected before touching storage.
    #[error("Invalid write: {0}")]
    InvalidWrite(String),

    /// A stored row could not be decoded into a domain value.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<StockShortfall> for StoreError {
    fn from(shortfall: StockShortfall) -> Self {
        StoreError::InsufficientStock {
            product_id: shortfall.product_id,
            available: shortfall.available,
            requested: shortfall.requested,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
