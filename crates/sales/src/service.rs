//! Order service: intake and lifecycle operations.

use std::time::Instant;

use chrono::{DateTime, Utc};
use domain::{
    CustomerId, Order, OrderError, OrderId, OrderStatus, PlaceOrder, StatusChange,
    StatusOperation,
};
use order_store::{Catalog, OrderQuery, OrderStore, OrderStoreExt, Page, StoreError};

use crate::error::{Result, SalesError};

/// Service for placing and managing orders.
///
/// Holds no state of its own. Every decision is made by the `domain`
/// aggregate and committed through a single store write, so a failed call
/// leaves stock and orders exactly as they were.
pub struct OrderService<S> {
    store: S,
}

impl<S> OrderService<S>
where
    S: Catalog + OrderStore,
{
    /// Creates a new order service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validates, prices, and persists a new order, reserving its stock.
    #[tracing::instrument(
        skip(self, cmd),
        fields(customer_id = %cmd.customer_id, lines = cmd.lines.len())
    )]
    pub async fn create_order(&self, cmd: PlaceOrder) -> Result<Order> {
        let started = Instant::now();
        let result = self.place(cmd).await;
        metrics::histogram!("order_intake_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(
                    order_id = %order.id(),
                    total = %order.total_price(),
                    "order created"
                );
            }
            Err(e) => {
                metrics::counter!("orders_rejected_total", "reason" => e.kind().as_str())
                    .increment(1);
                tracing::warn!(kind = %e.kind(), error = %e, "order rejected");
            }
        }

        result
    }

    async fn place(&self, cmd: PlaceOrder) -> Result<Order> {
        let products = self
            .store
            .get_products_by_ids(&cmd.product_ids())
            .await?;

        let placed = Order::place(cmd, &products, Utc::now())?;
        self.store
            .save(&placed.order, &placed.reservations)
            .await?;

        Ok(placed.order)
    }

    /// Sets an arbitrary status. Moves no stock.
    #[tracing::instrument(skip(self))]
    pub async fn set_status(&self, order_id: OrderId, status: OrderStatus) -> Result<Order> {
        self.transition(order_id, None, StatusOperation::SetStatus, |order, at| {
            Ok(order.set_status(status, at))
        })
        .await
    }

    /// Cancels a Pending or Processing order and restores its stock.
    #[tracing::instrument(skip(self))]
    pub async fn admin_cancel(&self, order_id: OrderId) -> Result<Order> {
        self.transition(order_id, None, StatusOperation::AdminCancel, |order, at| {
            order.admin_cancel(at)
        })
        .await
    }

    /// Cancels the customer's own Pending or Processing order and restores
    /// its stock. Other customers' orders are reported as not found.
    #[tracing::instrument(skip(self))]
    pub async fn customer_cancel(
        &self,
        customer_id: CustomerId,
        order_id: OrderId,
    ) -> Result<Order> {
        self.transition(
            order_id,
            Some(customer_id),
            StatusOperation::CustomerCancel,
            |order, at| order.customer_cancel(at),
        )
        .await
    }

    /// Refunds a Completed order. Stock is not restored.
    #[tracing::instrument(skip(self))]
    pub async fn refund(&self, order_id: OrderId) -> Result<Order> {
        self.transition(order_id, None, StatusOperation::Refund, |order, at| {
            order.refund(at)
        })
        .await
    }

    /// Loads an order by ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .find_by_id(order_id)
            .await?
            .ok_or(SalesError::OrderNotFound(order_id))
    }

    /// Loads an order owned by `customer_id`.
    #[tracing::instrument(skip(self))]
    pub async fn get_order_for_customer(
        &self,
        customer_id: CustomerId,
        order_id: OrderId,
    ) -> Result<Order> {
        self.store
            .find_by_id_for_customer(customer_id, order_id)
            .await?
            .ok_or(SalesError::OrderNotFound(order_id))
    }

    /// Lists orders matching the query.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>> {
        Ok(self.store.list_all(query).await?)
    }

    /// Lists one customer's orders.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders_for_customer(
        &self,
        customer_id: CustomerId,
        query: &OrderQuery,
    ) -> Result<Page<Order>> {
        Ok(self.store.list_for_customer(customer_id, query).await?)
    }

    /// Loads the order, lets `decide` compute the change, and commits it.
    ///
    /// The store only applies the change if the order still has the status
    /// `decide` saw; losing that race is reported as an invalid transition
    /// from whatever status won.
    async fn transition<F>(
        &self,
        order_id: OrderId,
        owner: Option<CustomerId>,
        operation: StatusOperation,
        decide: F,
    ) -> Result<Order>
    where
        F: FnOnce(&Order, DateTime<Utc>) -> std::result::Result<StatusChange, OrderError> + Send,
    {
        let result = self.apply_transition(order_id, owner, operation, decide).await;

        match &result {
            Ok(order) => {
                metrics::counter!("order_transitions_total", "operation" => operation.as_str())
                    .increment(1);
                tracing::info!(%order_id, status = %order.status(), "order status changed");
            }
            Err(e) => {
                metrics::counter!(
                    "order_transitions_rejected_total",
                    "operation" => operation.as_str()
                )
                .increment(1);
                tracing::warn!(%order_id, kind = %e.kind(), error = %e, "transition rejected");
            }
        }

        result
    }

    async fn apply_transition<F>(
        &self,
        order_id: OrderId,
        owner: Option<CustomerId>,
        operation: StatusOperation,
        decide: F,
    ) -> Result<Order>
    where
        F: FnOnce(&Order, DateTime<Utc>) -> std::result::Result<StatusChange, OrderError> + Send,
    {
        let found = match owner {
            Some(customer_id) => {
                self.store
                    .find_by_id_for_customer(customer_id, order_id)
                    .await?
            }
            None => self.store.find_by_id(order_id).await?,
        };
        let mut order = found.ok_or(SalesError::OrderNotFound(order_id))?;

        let change = decide(&order, Utc::now())?;

        self.store.update(&change).await.map_err(|e| match e {
            StoreError::StatusConflict { actual, .. } => SalesError::InvalidStatusTransition {
                current: actual,
                operation,
            },
            // A concurrent cancel and reopen released the stock after `order` was read.
            StoreError::ReservationReleased(_) => SalesError::InvalidStatusTransition {
                current: change.from,
                operation,
            },
            other => SalesError::from(other),
        })?;

        order.apply(&change);
        Ok(order)
    }
}
