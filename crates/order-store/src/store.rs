use async_trait::async_trait;
use domain::{
    CustomerId, MovementKind, Order, OrderId, Product, ProductId, StatusChange, StockMovement,
    inventory,
};

use crate::{OrderQuery, Page, Result, StoreError};

/// Read access to the product catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fetches the products with the given IDs.
    ///
    /// IDs with no matching product are left out of the result; callers
    /// detect missing products by comparing against what they asked for.
    async fn get_products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>>;
}

/// Standalone stock movements against a single product.
///
/// Order intake and cancellation do not go through these methods; their
/// stock changes are committed together with the order write by
/// [`OrderStore::save`] and [`OrderStore::update`].
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Decrements stock if at least `quantity` units are available.
    ///
    /// Returns the remaining stock.
    async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<u32>;

    /// Increments stock. Returns the new stock level.
    async fn release(&self, product_id: &ProductId, quantity: u32) -> Result<u32>;

    /// Current stock for a product, or None if it doesn't exist.
    async fn stock_level(&self, product_id: &ProductId) -> Result<Option<u32>>;
}

/// Core trait for order persistence.
///
/// Every write is atomic: the order row and the stock movements that go
/// with it either all commit or none do.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order and applies its stock reservations.
    ///
    /// Each reservation is a conditional decrement. If any product no
    /// longer has enough stock the whole write fails with
    /// `InsufficientStock` and nothing is changed.
    async fn save(&self, order: &Order, reservations: &[StockMovement]) -> Result<()>;

    /// Applies a status change and its restock movements.
    ///
    /// The write only succeeds while the stored status still equals
    /// `change.from`; otherwise it fails with `StatusConflict`.
    async fn update(&self, change: &StatusChange) -> Result<()>;

    /// Loads an order by ID.
    async fn find_by_id(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Lists orders matching the query, one page at a time.
    async fn list_all(&self, query: &OrderQuery) -> Result<Page<Order>>;
}

/// Extension trait providing customer-scoped reads.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Loads an order only if it belongs to `customer_id`.
    async fn find_by_id_for_customer(
        &self,
        customer_id: CustomerId,
        order_id: OrderId,
    ) -> Result<Option<Order>> {
        Ok(self
            .find_by_id(order_id)
            .await?
            .filter(|order| order.is_owned_by(customer_id)))
    }

    /// Lists one customer's orders. Any customer filter already on the
    /// query is replaced.
    async fn list_for_customer(
        &self,
        customer_id: CustomerId,
        query: &OrderQuery,
    ) -> Result<Page<Order>> {
        let scoped = query.clone().customer(customer_id);
        self.list_all(&scoped).await
    }

    /// Checks if an order exists.
    async fn order_exists(&self, order_id: OrderId) -> Result<bool> {
        Ok(self.find_by_id(order_id).await?.is_some())
    }
}

// Blanket implementation for all OrderStore implementations
impl<T: OrderStore + ?Sized> OrderStoreExt for T {}

/// Validates a new order and its reservations before writing.
///
/// Reservations must be positive `Reserve` movements that add up, per
/// product, to the order's line quantities.
pub fn validate_new_order(order: &Order, reservations: &[StockMovement]) -> Result<()> {
    if order.lines().is_empty() {
        return Err(StoreError::InvalidWrite(format!(
            "order {} has no lines",
            order.id()
        )));
    }

    if order.lines_total() != Some(order.total_price()) {
        return Err(StoreError::InvalidWrite(format!(
            "order {} total {} does not match its lines",
            order.id(),
            order.total_price()
        )));
    }

    if !order.stock_reserved() {
        return Err(StoreError::InvalidWrite(format!(
            "order {} does not hold its reservation",
            order.id()
        )));
    }

    validate_movements(reservations, MovementKind::Reserve)?;

    let expected = inventory::consolidate(
        MovementKind::Reserve,
        order
            .lines()
            .iter()
            .map(|line| (&line.product_id, line.quantity)),
    );
    let mut actual = reservations.to_vec();
    actual.sort_by(|a, b| a.product_id.cmp(&b.product_id));
    if actual != expected {
        return Err(StoreError::InvalidWrite(format!(
            "reservations for order {} do not match its lines",
            order.id()
        )));
    }

    Ok(())
}

/// Validates a status change before writing.
pub fn validate_status_change(change: &StatusChange) -> Result<()> {
    validate_movements(&change.restock, MovementKind::Release)
}

fn validate_movements(movements: &[StockMovement], kind: MovementKind) -> Result<()> {
    for movement in movements {
        if movement.kind != kind {
            return Err(StoreError::InvalidWrite(format!(
                "expected {:?} movement for {}, got {:?}",
                kind, movement.product_id, movement.kind
            )));
        }
        if movement.quantity == 0 {
            return Err(StoreError::InvalidWrite(format!(
                "zero-quantity movement for {}",
                movement.product_id
            )));
        }
    }
    Ok(())
}
