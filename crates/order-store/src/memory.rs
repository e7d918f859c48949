use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{Order, OrderId, Product, ProductId, StatusChange, StockMovement};
use tokio::sync::RwLock;

use crate::{
    OrderQuery, Page, Result, StoreError,
    store::{Catalog, InventoryLedger, OrderStore, validate_new_order, validate_status_change},
};

#[derive(Default)]
struct State {
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
}

impl State {
    /// Computes the stock levels `movements` would leave behind without
    /// touching any product. Fails on the first missing product or shortfall.
    fn stage(&self, movements: &[StockMovement]) -> Result<HashMap<ProductId, u32>> {
        let mut staged: HashMap<ProductId, u32> = HashMap::new();
        for movement in movements {
            let product = self
                .products
                .get(&movement.product_id)
                .ok_or_else(|| StoreError::ProductNotFound(movement.product_id.clone()))?;
            let current = staged
                .get(&movement.product_id)
                .copied()
                .unwrap_or(product.stock_quantity);
            let next = movement.apply_to(current)?;
            staged.insert(movement.product_id.clone(), next);
        }
        Ok(staged)
    }

    fn commit(&mut self, staged: HashMap<ProductId, u32>) {
        for (product_id, level) in staged {
            if let Some(product) = self.products.get_mut(&product_id) {
                product.stock_quantity = level;
            }
        }
    }
}

/// In-memory store implementation for testing.
///
/// Products and orders share one lock, so every write validates all of
/// its stock movements before committing any of them.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with a catalog.
    pub async fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let store = Self::new();
        for product in products {
            store.insert_product(product).await;
        }
        store
    }

    /// Adds or replaces a catalog entry.
    pub async fn insert_product(&self, product: Product) {
        self.state
            .write()
            .await
            .products
            .insert(product.id.clone(), product);
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl Catalog for InMemoryStore {
    async fn get_products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl InventoryLedger for InMemoryStore {
    async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<u32> {
        self.apply_movement(StockMovement::reserve(product_id.clone(), quantity))
            .await
    }

    async fn release(&self, product_id: &ProductId, quantity: u32) -> Result<u32> {
        self.apply_movement(StockMovement::release(product_id.clone(), quantity))
            .await
    }

    async fn stock_level(&self, product_id: &ProductId) -> Result<Option<u32>> {
        let state = self.state.read().await;
        Ok(state.products.get(product_id).map(|p| p.stock_quantity))
    }
}

impl InMemoryStore {
    async fn apply_movement(&self, movement: StockMovement) -> Result<u32> {
        let mut state = self.state.write().await;
        let staged = state.stage(std::slice::from_ref(&movement))?;
        let level = staged
            .get(&movement.product_id)
            .copied()
            .ok_or_else(|| StoreError::ProductNotFound(movement.product_id.clone()))?;
        state.commit(staged);
        Ok(level)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn save(&self, order: &Order, reservations: &[StockMovement]) -> Result<()> {
        validate_new_order(order, reservations)?;

        let mut state = self.state.write().await;

        if state.orders.contains_key(&order.id()) {
            return Err(StoreError::DuplicateOrder(order.id()));
        }

        let staged = state.stage(reservations)?;
        state.commit(staged);
        state.orders.insert(order.id(), order.clone());

        Ok(())
    }

    async fn update(&self, change: &StatusChange) -> Result<()> {
        validate_status_change(change)?;

        let mut state = self.state.write().await;

        let (actual, reserved) = state
            .orders
            .get(&change.order_id)
            .map(|order| (order.status(), order.stock_reserved()))
            .ok_or(StoreError::OrderNotFound(change.order_id))?;

        if actual != change.from {
            return Err(StoreError::StatusConflict {
                order_id: change.order_id,
                expected: change.from,
                actual,
            });
        }

        if change.releases_stock() && !reserved {
            return Err(StoreError::ReservationReleased(change.order_id));
        }

        let staged = state.stage(&change.restock)?;
        state.commit(staged);
        if let Some(order) = state.orders.get_mut(&change.order_id) {
            order.apply(change);
        }

        Ok(())
    }

    async fn find_by_id(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn list_all(&self, query: &OrderQuery) -> Result<Page<Order>> {
        let state = self.state.read().await;

        let mut matching: Vec<&Order> = state
            .orders
            .values()
            .filter(|order| query.filter.matches(order))
            .collect();
        matching.sort_by(|a, b| query.sort.compare(a, b));

        let total_count = matching.len() as u64;
        let offset = usize::try_from(query.page.offset()).unwrap_or(usize::MAX);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(query.page.size() as usize)
            .cloned()
            .collect();

        Ok(Page::new(items, total_count, query.page))
    }
}
