//! Order aggregate and related types.

mod aggregate;
mod state;
mod transition;
mod value_objects;

pub use aggregate::{Order, OrderParts, PlacedOrder};
pub use state::{OrderStatus, UnknownOrderStatus};
pub use transition::{StatusChange, StatusOperation};
pub use value_objects::{LineRequest, OrderLine, PlaceOrder, ShippingAddress};

use thiserror::Error;

use crate::ProductId;

/// Business rule violations raised by the order aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// A requested product does not exist in the catalog.
    #[error("Product not found: {product_id}")]
    ProductNotFound { product_id: ProductId },

    /// A requested quantity exceeds the available stock.
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    /// The order's current status does not allow the operation.
    #[error("Invalid status transition: cannot {operation} from {current} status")]
    InvalidStatusTransition {
        current: OrderStatus,
        operation: StatusOperation,
    },

    /// The order has no lines.
    #[error("Order has no lines")]
    NoLines,

    /// A line has a zero quantity.
    #[error("Invalid quantity for {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    /// A line total is too large to represent.
    #[error("Line total overflows for {product_id} x {quantity}")]
    LineTotalOverflow { product_id: ProductId, quantity: u32 },

    /// The sum of the line totals is too large to represent.
    #[error("Order total overflows")]
    OrderTotalOverflow,
}

impl From<crate::StockShortfall> for OrderError {
    fn from(shortfall: crate::StockShortfall) -> Self {
        OrderError::InsufficientStock {
            product_id: shortfall.product_id,
            available: shortfall.available,
            requested: shortfall.requested,
        }
    }
}
