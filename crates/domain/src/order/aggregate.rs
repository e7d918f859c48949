//! Order aggregate implementation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::inventory::{self, MovementKind};
use crate::{CustomerId, Money, OrderId, Product, ProductId, StockMovement, pricing};

use super::{
    OrderError, OrderLine, OrderStatus, PlaceOrder, ShippingAddress, StatusChange,
    StatusOperation,
};

/// Order aggregate root.
///
/// Created once by [`Order::place`] with its lines and total frozen; from
/// then on only its status (and update timestamp) changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    customer_id: CustomerId,
    status: OrderStatus,
    /// Lines in request order.
    lines: Vec<OrderLine>,
    /// Sum of the line totals, fixed at creation.
    total_price: Money,
    notes: Option<String>,
    shipping_address: ShippingAddress,
    /// True while the line quantities are held out of stock. Cleared by
    /// the first cancellation so the quantities are released only once.
    stock_reserved: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Stored fields of an order, used by persistence adapters to rebuild it.
#[derive(Debug, Clone)]
pub struct OrderParts {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub total_price: Money,
    pub notes: Option<String>,
    pub shipping_address: ShippingAddress,
    pub stock_reserved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A newly placed order together with the stock it must reserve.
///
/// Both halves must be committed in one transaction.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    /// One reservation per distinct product, sorted by product ID.
    pub reservations: Vec<StockMovement>,
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn total_price(&self) -> Money {
        self.total_price
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn shipping_address(&self) -> &ShippingAddress {
        &self.shipping_address
    }

    /// Returns true if the order still holds its line quantities.
    pub fn stock_reserved(&self) -> bool {
        self.stock_reserved
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Recomputes the sum of the line totals, or None on overflow.
    ///
    /// Always equal to [`Order::total_price`] for a well-formed order.
    pub fn lines_total(&self) -> Option<Money> {
        Money::checked_sum(self.lines.iter().map(|line| line.line_total))
    }

    /// Returns true if the order belongs to the given customer.
    pub fn is_owned_by(&self, customer_id: CustomerId) -> bool {
        self.customer_id == customer_id
    }
}

// Command methods
impl Order {
    /// Validates a purchase request against the current catalog records and
    /// builds the priced order.
    ///
    /// `catalog` holds the products returned for the requested IDs; missing
    /// IDs are detected by absence. Validation is all-or-nothing: every
    /// line is checked for existence before any line is checked for stock.
    pub fn place(
        cmd: PlaceOrder,
        catalog: &[Product],
        now: DateTime<Utc>,
    ) -> Result<PlacedOrder, OrderError> {
        if cmd.lines.is_empty() {
            return Err(OrderError::NoLines);
        }

        if let Some(line) = cmd.lines.iter().find(|line| line.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                product_id: line.product_id.clone(),
                quantity: line.quantity,
            });
        }

        let products: HashMap<&ProductId, &Product> =
            catalog.iter().map(|product| (&product.id, product)).collect();

        for line in &cmd.lines {
            if !products.contains_key(&line.product_id) {
                return Err(OrderError::ProductNotFound {
                    product_id: line.product_id.clone(),
                });
            }
        }

        // Lines for the same product draw from the same stock.
        let mut remaining: HashMap<&ProductId, u32> = HashMap::new();
        for line in &cmd.lines {
            let product = products[&line.product_id];
            let available = remaining
                .entry(&product.id)
                .or_insert(product.stock_quantity);
            if *available < line.quantity {
                return Err(OrderError::InsufficientStock {
                    product_id: line.product_id.clone(),
                    available: *available,
                    requested: line.quantity,
                });
            }
            *available -= line.quantity;
        }

        let lines = cmd
            .lines
            .iter()
            .map(|line| {
                let product = products[&line.product_id];
                let price = pricing::price(product, line.quantity).ok_or_else(|| {
                    OrderError::LineTotalOverflow {
                        product_id: line.product_id.clone(),
                        quantity: line.quantity,
                    }
                })?;
                Ok(OrderLine::priced(
                    line.product_id.clone(),
                    line.quantity,
                    product.discount,
                    price,
                ))
            })
            .collect::<Result<Vec<OrderLine>, OrderError>>()?;

        let total_price = Money::checked_sum(lines.iter().map(|line| line.line_total))
            .ok_or(OrderError::OrderTotalOverflow)?;
        let reservations = inventory::consolidate(
            MovementKind::Reserve,
            lines.iter().map(|line| (&line.product_id, line.quantity)),
        );

        let order = Order {
            id: OrderId::new(),
            customer_id: cmd.customer_id,
            status: OrderStatus::Pending,
            lines,
            total_price,
            notes: cmd.notes,
            shipping_address: cmd.shipping_address,
            stock_reserved: true,
            created_at: now,
            updated_at: now,
        };

        Ok(PlacedOrder {
            order,
            reservations,
        })
    }

    /// Administrative status write. Allowed from any status, moves no stock.
    pub fn set_status(&self, to: OrderStatus, at: DateTime<Utc>) -> StatusChange {
        self.change(StatusOperation::SetStatus, to, at, Vec::new())
    }

    /// Cancels on behalf of an administrator, restoring all line quantities
    /// unless an earlier cancellation already did.
    pub fn admin_cancel(&self, at: DateTime<Utc>) -> Result<StatusChange, OrderError> {
        self.cancel(StatusOperation::AdminCancel, at)
    }

    /// Cancels on behalf of the owning customer, restoring all line
    /// quantities unless an earlier cancellation already did.
    ///
    /// Ownership is checked by the caller when loading the order.
    pub fn customer_cancel(&self, at: DateTime<Utc>) -> Result<StatusChange, OrderError> {
        self.cancel(StatusOperation::CustomerCancel, at)
    }

    /// Refunds a completed order. Stock stays consumed.
    pub fn refund(&self, at: DateTime<Utc>) -> Result<StatusChange, OrderError> {
        if !self.status.can_refund() {
            return Err(OrderError::InvalidStatusTransition {
                current: self.status,
                operation: StatusOperation::Refund,
            });
        }

        Ok(self.change(StatusOperation::Refund, OrderStatus::Refunded, at, Vec::new()))
    }

    /// Applies a persisted status change to this aggregate.
    pub fn apply(&mut self, change: &StatusChange) {
        debug_assert_eq!(change.order_id, self.id);
        self.status = change.to;
        self.updated_at = change.changed_at;
        if change.releases_stock() {
            self.stock_reserved = false;
        }
    }

    /// Rebuilds an order from stored fields.
    pub fn restore(parts: OrderParts) -> Self {
        Self {
            id: parts.id,
            customer_id: parts.customer_id,
            status: parts.status,
            lines: parts.lines,
            total_price: parts.total_price,
            notes: parts.notes,
            shipping_address: parts.shipping_address,
            stock_reserved: parts.stock_reserved,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        }
    }

    fn cancel(
        &self,
        operation: StatusOperation,
        at: DateTime<Utc>,
    ) -> Result<StatusChange, OrderError> {
        if !self.status.can_cancel() {
            return Err(OrderError::InvalidStatusTransition {
                current: self.status,
                operation,
            });
        }

        // A reopened order was already restocked by its first cancellation.
        let restock = if self.stock_reserved {
            inventory::consolidate(
                MovementKind::Release,
                self.lines
                    .iter()
                    .map(|line| (&line.product_id, line.quantity)),
            )
        } else {
            Vec::new()
        };

        Ok(self.change(operation, OrderStatus::Canceled, at, restock))
    }

    fn change(
        &self,
        operation: StatusOperation,
        to: OrderStatus,
        at: DateTime<Utc>,
        restock: Vec<StockMovement>,
    ) -> StatusChange {
        StatusChange {
            order_id: self.id,
            operation,
            from: self.status,
            to,
            changed_at: at,
            restock,
        }
    }
}
