//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p order-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use domain::{
    CustomerId, DiscountTier, LineRequest, Money, Order, OrderStatus, PlaceOrder, PlacedOrder,
    Product, ProductId, ShippingAddress,
};
use order_store::{
    Catalog, InventoryLedger, OrderQuery, OrderSort, OrderStore, OrderStoreExt, PostgresStore,
    StoreError,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            // Run migrations using raw_sql to execute multiple statements
            for migration in [
                include_str!("../../../migrations/001_create_storefront_tables.sql"),
                include_str!("../../../migrations/002_add_order_stock_reserved.sql"),
            ] {
                sqlx::raw_sql(migration).execute(&temp_pool).await.unwrap();
            }

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool, cleared tables, and a seeded catalog
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_lines, orders, products")
        .execute(&pool)
        .await
        .unwrap();

    let store = PostgresStore::new(pool);
    for product in catalog() {
        store.upsert_product(&product).await.unwrap();
    }
    store
}

fn catalog() -> Vec<Product> {
    vec![
        Product::new("SKU-MUG", "Mug", Money::from_cents(1_250), DiscountTier::NONE, 10),
        Product::new("SKU-CAP", "Cap", Money::from_cents(10_000), DiscountTier::TEN_PERCENT, 6),
        Product::new("SKU-PIN", "Pin", Money::from_cents(99), DiscountTier::FIFTY_PERCENT, 5),
    ]
}

fn address() -> ShippingAddress {
    ShippingAddress {
        street_number: "221B".to_string(),
        street_name: "Baker Street".to_string(),
        city: "London".to_string(),
        state: "Greater London".to_string(),
        zip_code: "NW1 6XE".to_string(),
        country: "UK".to_string(),
    }
}

fn place(customer_id: CustomerId, lines: Vec<LineRequest>) -> PlacedOrder {
    let cmd = PlaceOrder::new(customer_id, address(), lines).with_notes("leave at door");
    Order::place(cmd, &catalog(), Utc::now()).unwrap()
}

async fn stock(store: &PostgresStore, id: &str) -> u32 {
    store.stock_level(&ProductId::new(id)).await.unwrap().unwrap()
}

#[tokio::test]
async fn catalog_lookup() {
    let store = get_test_store().await;

    let mut products = store
        .get_products_by_ids(&[ProductId::new("SKU-CAP"), ProductId::new("SKU-NOPE")])
        .await
        .unwrap();

    assert_eq!(products.len(), 1);
    let cap = products.remove(0);
    assert_eq!(cap.price, Money::from_cents(10_000));
    assert_eq!(cap.discount, DiscountTier::TEN_PERCENT);
    assert_eq!(cap.stock_quantity, 6);
}

#[tokio::test]
async fn save_and_load_order() {
    let store = get_test_store().await;
    let customer = CustomerId::new();
    let placed = place(
        customer,
        vec![
            LineRequest::new("SKU-CAP", 3),
            LineRequest::new("SKU-MUG", 2),
            LineRequest::new("SKU-CAP", 1),
        ],
    );

    store.save(&placed.order, &placed.reservations).await.unwrap();

    let loaded = store.find_by_id(placed.order.id()).await.unwrap().unwrap();
    assert_eq!(loaded.customer_id(), customer);
    assert_eq!(loaded.status(), OrderStatus::Pending);
    assert_eq!(loaded.lines(), placed.order.lines());
    assert_eq!(loaded.total_price(), placed.order.total_price());
    assert_eq!(loaded.lines_total(), Some(loaded.total_price()));
    assert_eq!(loaded.notes(), Some("leave at door"));
    assert_eq!(loaded.shipping_address(), &address());
    assert!(loaded.stock_reserved());

    assert_eq!(stock(&store, "SKU-CAP").await, 2);
    assert_eq!(stock(&store, "SKU-MUG").await, 8);
}

#[tokio::test]
async fn save_rolls_back_on_shortfall() {
    let store = get_test_store().await;

    // Someone else drains SKU-PIN after the catalog was read.
    store.reserve(&ProductId::new("SKU-PIN"), 4).await.unwrap();

    let placed = place(
        CustomerId::new(),
        vec![LineRequest::new("SKU-MUG", 3), LineRequest::new("SKU-PIN", 2)],
    );
    let result = store.save(&placed.order, &placed.reservations).await;

    assert!(matches!(
        result,
        Err(StoreError::InsufficientStock { available: 1, requested: 2, .. })
    ));
    assert_eq!(stock(&store, "SKU-MUG").await, 10);
    assert_eq!(stock(&store, "SKU-PIN").await, 1);
    assert!(!store.order_exists(placed.order.id()).await.unwrap());
}

#[tokio::test]
async fn duplicate_order_is_rejected() {
    let store = get_test_store().await;
    let placed = place(CustomerId::new(), vec![LineRequest::new("SKU-MUG", 1)]);

    store.save(&placed.order, &placed.reservations).await.unwrap();
    let result = store.save(&placed.order, &placed.reservations).await;

    assert!(matches!(result, Err(StoreError::DuplicateOrder(_))));
    assert_eq!(stock(&store, "SKU-MUG").await, 9);
}

#[tokio::test]
async fn cancel_restocks_once() {
    let store = get_test_store().await;
    let placed = place(CustomerId::new(), vec![LineRequest::new("SKU-CAP", 4)]);
    store.save(&placed.order, &placed.reservations).await.unwrap();

    let first = placed.order.admin_cancel(Utc::now()).unwrap();
    let second = placed.order.customer_cancel(Utc::now()).unwrap();

    store.update(&first).await.unwrap();
    let result = store.update(&second).await;

    assert!(matches!(
        result,
        Err(StoreError::StatusConflict {
            expected: OrderStatus::Pending,
            actual: OrderStatus::Canceled,
            ..
        })
    ));
    assert_eq!(stock(&store, "SKU-CAP").await, 6);

    let loaded = store.find_by_id(placed.order.id()).await.unwrap().unwrap();
    assert_eq!(loaded.status(), OrderStatus::Canceled);
}

#[tokio::test]
async fn reopened_order_is_restocked_once() {
    let store = get_test_store().await;
    let placed = place(CustomerId::new(), vec![LineRequest::new("SKU-MUG", 6)]);
    store.save(&placed.order, &placed.reservations).await.unwrap();
    assert_eq!(stock(&store, "SKU-MUG").await, 4);

    store
        .update(&placed.order.admin_cancel(Utc::now()).unwrap())
        .await
        .unwrap();
    assert_eq!(stock(&store, "SKU-MUG").await, 10);

    let canceled = store.find_by_id(placed.order.id()).await.unwrap().unwrap();
    assert!(!canceled.stock_reserved());
    store
        .update(&canceled.set_status(OrderStatus::Pending, Utc::now()))
        .await
        .unwrap();

    let reopened = store.find_by_id(placed.order.id()).await.unwrap().unwrap();
    assert_eq!(reopened.status(), OrderStatus::Pending);
    assert!(!reopened.stock_reserved());
    store
        .update(&reopened.admin_cancel(Utc::now()).unwrap())
        .await
        .unwrap();
    assert_eq!(stock(&store, "SKU-MUG").await, 10);

    // Reopen again, then replay a cancel computed from the original
    // Pending snapshot, which still carries the restock.
    let canceled = store.find_by_id(placed.order.id()).await.unwrap().unwrap();
    store
        .update(&canceled.set_status(OrderStatus::Pending, Utc::now()))
        .await
        .unwrap();
    let stale = placed.order.customer_cancel(Utc::now()).unwrap();
    let result = store.update(&stale).await;

    assert!(matches!(
        result,
        Err(StoreError::ReservationReleased(id)) if id == placed.order.id()
    ));
    assert_eq!(stock(&store, "SKU-MUG").await, 10);
}

#[tokio::test]
async fn update_missing_order() {
    let store = get_test_store().await;
    let placed = place(CustomerId::new(), vec![LineRequest::new("SKU-MUG", 1)]);
    let change = placed.order.set_status(OrderStatus::Processing, Utc::now());

    let result = store.update(&change).await;

    assert!(matches!(result, Err(StoreError::OrderNotFound(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_intake_never_oversells() {
    let store = get_test_store().await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let placed = place(CustomerId::new(), vec![LineRequest::new("SKU-PIN", 1)]);
            store.save(&placed.order, &placed.reservations).await
        }));
    }

    let mut accepted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => accepted += 1,
            Err(StoreError::InsufficientStock { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(accepted, 5);
    assert_eq!(rejected, 5);
    assert_eq!(stock(&store, "SKU-PIN").await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cancels_restock_once() {
    let store = get_test_store().await;
    let placed = place(CustomerId::new(), vec![LineRequest::new("SKU-MUG", 3)]);
    store.save(&placed.order, &placed.reservations).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..5 {
        let store = store.clone();
        let change = placed.order.admin_cancel(Utc::now()).unwrap();
        handles.push(tokio::spawn(async move { store.update(&change).await }));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(stock(&store, "SKU-MUG").await, 10);
}

#[tokio::test]
async fn list_filters_sorts_and_pages() {
    let store = get_test_store().await;
    let alice = CustomerId::new();
    let bob = CustomerId::new();

    let mut alice_orders = Vec::new();
    for _ in 0..3 {
        let placed = place(alice, vec![LineRequest::new("SKU-MUG", 1)]);
        store.save(&placed.order, &placed.reservations).await.unwrap();
        alice_orders.push(placed.order.id());
    }
    let big = place(bob, vec![LineRequest::new("SKU-CAP", 2)]);
    store.save(&big.order, &big.reservations).await.unwrap();

    let all = store.list_all(&OrderQuery::new()).await.unwrap();
    assert_eq!(all.total_count, 4);
    assert_eq!(all.total_pages, 1);
    assert_eq!(all.items[0].id(), big.order.id());
    assert!(all.items.iter().all(|o| o.lines().len() == 1));

    let by_total = store
        .list_all(&OrderQuery::new().sort(OrderSort::TotalDesc).page(1, 1))
        .await
        .unwrap();
    assert_eq!(by_total.total_pages, 4);
    assert_eq!(by_total.items.len(), 1);
    assert_eq!(by_total.items[0].total_price(), Money::from_cents(18_000));

    let alices = store
        .list_for_customer(alice, &OrderQuery::new().sort(OrderSort::CreatedAsc).page(2, 2))
        .await
        .unwrap();
    assert_eq!(alices.total_count, 3);
    assert_eq!(alices.items.len(), 1);
    assert_eq!(alices.items[0].id(), alice_orders[2]);

    let window = store
        .list_all(
            &OrderQuery::new()
                .status(OrderStatus::Pending)
                .max_total(Money::from_cents(2_000))
                .created_from(Utc::now() - Duration::hours(1))
                .created_to(Utc::now() + Duration::hours(1)),
        )
        .await
        .unwrap();
    assert_eq!(window.total_count, 3);

    let mut ids = alice_orders.clone();
    ids.push(big.order.id());
    ids.sort();
    let by_id = store
        .list_all(&OrderQuery::new().sort(OrderSort::IdDesc))
        .await
        .unwrap();
    let listed: Vec<_> = by_id.items.iter().map(|o| o.id()).collect();
    assert_eq!(listed, ids.iter().rev().copied().collect::<Vec<_>>());

    let later = Utc::now() + Duration::hours(1);
    store
        .update(&big.order.set_status(OrderStatus::Processing, later))
        .await
        .unwrap();
    let touched = store
        .list_all(&OrderQuery::new().updated_from(later).sort(OrderSort::IdAsc))
        .await
        .unwrap();
    assert_eq!(touched.total_count, 1);
    assert_eq!(touched.items[0].id(), big.order.id());
    let untouched = store
        .list_all(&OrderQuery::new().updated_to(later - Duration::minutes(1)))
        .await
        .unwrap();
    assert_eq!(untouched.total_count, 3);

    assert!(
        store
            .find_by_id_for_customer(bob, alice_orders[0])
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn ledger_reserve_and_release() {
    let store = get_test_store().await;
    let pin = ProductId::new("SKU-PIN");

    assert_eq!(store.reserve(&pin, 5).await.unwrap(), 0);
    assert!(matches!(
        store.reserve(&pin, 1).await,
        Err(StoreError::InsufficientStock { available: 0, .. })
    ));
    assert_eq!(store.release(&pin, 3).await.unwrap(), 3);
    assert!(matches!(
        store.release(&ProductId::new("SKU-NOPE"), 1).await,
        Err(StoreError::ProductNotFound(_))
    ));
}
