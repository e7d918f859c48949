//! Domain layer for the storefront order core.
//!
//! This crate is pure: no I/O, no clocks, no logging. It provides:
//! - Product and discount tier values read from the catalog
//! - The pricing engine that freezes per-line prices
//! - Inventory ledger arithmetic (reservations and releases)
//! - The Order aggregate with its status state machine

pub mod inventory;
pub mod order;
pub mod pricing;
pub mod product;

pub use common::{CustomerId, Money, OrderId, ProductId};
pub use inventory::{MovementKind, StockMovement, StockShortfall};
pub use order::{
    LineRequest, Order, OrderError, OrderLine, OrderParts, OrderStatus, PlaceOrder, PlacedOrder,
    ShippingAddress, StatusChange, StatusOperation, UnknownOrderStatus,
};
pub use pricing::LinePrice;
pub use product::{DiscountTier, InvalidDiscountTier, Product};
