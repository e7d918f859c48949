//! Sales error types.

use std::fmt;

use domain::{OrderError, OrderId, OrderStatus, ProductId, StatusOperation};
use order_store::StoreError;
use thiserror::Error;

/// Errors returned by [`OrderService`](crate::OrderService) operations.
#[derive(Debug, Error)]
pub enum SalesError {
    /// A requested product is not in the catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// A line asked for more units than are in stock.
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    /// The order doesn't exist, or isn't visible to the caller.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The operation isn't allowed from the order's current status.
    #[error("Invalid status transition: cannot {operation} from {current} status")]
    InvalidStatusTransition {
        current: OrderStatus,
        operation: StatusOperation,
    },

    /// The request was malformed or its totals can't be represented.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The store failed. Prior state is unchanged.
    #[error("Persistence failure: {0}")]
    Persistence(#[source] StoreError),
}

/// Stable identifier for each failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ProductNotFound,
    InsufficientStock,
    OrderNotFound,
    InvalidStatusTransition,
    InvalidRequest,
    PersistenceFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ProductNotFound => "product_not_found",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::OrderNotFound => "order_not_found",
            ErrorKind::InvalidStatusTransition => "invalid_status_transition",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::PersistenceFailure => "persistence_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SalesError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SalesError::ProductNotFound(_) => ErrorKind::ProductNotFound,
            SalesError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            SalesError::OrderNotFound(_) => ErrorKind::OrderNotFound,
            SalesError::InvalidStatusTransition { .. } => ErrorKind::InvalidStatusTransition,
            SalesError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            SalesError::Persistence(_) => ErrorKind::PersistenceFailure,
        }
    }

    /// Whether this is an expected business outcome rather than an
    /// infrastructure failure.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, SalesError::Persistence(_))
    }
}

impl From<OrderError> for SalesError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::ProductNotFound { product_id } => SalesError::ProductNotFound(product_id),
            OrderError::InsufficientStock {
                product_id,
                available,
                requested,
            } => SalesError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            OrderError::InvalidStatusTransition { current, operation } => {
                SalesError::InvalidStatusTransition { current, operation }
            }
            other @ (OrderError::NoLines
            | OrderError::InvalidQuantity { .. }
            | OrderError::LineTotalOverflow { .. }
            | OrderError::OrderTotalOverflow) => SalesError::InvalidRequest(other.to_string()),
        }
    }
}

impl From<StoreError> for SalesError {
    /// Business outcomes detected by the store keep their business kind.
    ///
    /// `StatusConflict` and `ReservationReleased` lack the attempted
    /// operation, so callers that write status changes translate them
    /// themselves.
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientStock {
                product_id,
                available,
                requested,
            } => SalesError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            StoreError::ProductNotFound(product_id) => SalesError::ProductNotFound(product_id),
            StoreError::OrderNotFound(order_id) => SalesError::OrderNotFound(order_id),
            other => SalesError::Persistence(other),
        }
    }
}

/// Convenience type alias for sales results.
pub type Result<T> = std::result::Result<T, SalesError>;
