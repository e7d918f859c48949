use std::collections::HashMap;

use async_trait::async_trait;
use domain::{
    CustomerId, DiscountTier, Money, Order, OrderId, OrderLine, OrderParts, OrderStatus, Product,
    ProductId, ShippingAddress, StatusChange, StockMovement,
};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OrderFilter, OrderQuery, Page, Result, StoreError,
    store::{Catalog, InventoryLedger, OrderStore, validate_new_order, validate_status_change},
};

const ORDER_COLUMNS: &str = "id, customer_id, status, total_cents, notes, street_number, \
     street_name, city, state, zip_code, country, stock_reserved, created_at, updated_at";

/// PostgreSQL-backed store implementation.
///
/// Stock decrements are conditional updates (`stock_quantity >= n`) and
/// status writes are compare-and-set on the current status and, for
/// restocking writes, on `stock_reserved`, so concurrent callers can never
/// oversell, apply the same transition twice, or restock an order twice.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Inserts a product or overwrites the existing catalog entry.
    pub async fn upsert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, discount_percent, stock_quantity)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                discount_percent = EXCLUDED.discount_percent,
                stock_quantity = EXCLUDED.stock_quantity
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(i16::from(product.discount.percent()))
        .bind(to_db_quantity(product.stock_quantity)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        let discount: i16 = row.try_get("discount_percent")?;
        let stock: i32 = row.try_get("stock_quantity")?;

        Ok(Product {
            id: ProductId::new(row.try_get::<String, _>("id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            discount: DiscountTier::try_from(discount)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            stock_quantity: from_db_quantity(stock)?,
        })
    }

    fn row_to_line(row: &PgRow) -> Result<(Uuid, OrderLine)> {
        let discount: i16 = row.try_get("discount_percent")?;
        let quantity: i32 = row.try_get("quantity")?;

        let line = OrderLine {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity: from_db_quantity(quantity)?,
            discount: DiscountTier::try_from(discount)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            discounted_unit_price: Money::from_cents(row.try_get("discounted_unit_price_cents")?),
            line_total: Money::from_cents(row.try_get("line_total_cents")?),
        };
        Ok((row.try_get("order_id")?, line))
    }

    fn row_to_order(row: &PgRow, lines: Vec<OrderLine>) -> Result<Order> {
        let status: String = row.try_get("status")?;

        Ok(Order::restore(OrderParts {
            id: OrderId::from_uuid(row.try_get("id")?),
            customer_id: CustomerId::from_uuid(row.try_get("customer_id")?),
            status: parse_status(&status)?,
            lines,
            total_price: Money::from_cents(row.try_get("total_cents")?),
            notes: row.try_get("notes")?,
            shipping_address: ShippingAddress {
                street_number: row.try_get("street_number")?,
                street_name: row.try_get("street_name")?,
                city: row.try_get("city")?,
                state: row.try_get("state")?,
                zip_code: row.try_get("zip_code")?,
                country: row.try_get("country")?,
            },
            stock_reserved: row.try_get("stock_reserved")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    /// Loads lines for a set of orders, grouped by order and in line order.
    async fn load_lines(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderLine>>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, quantity, discount_percent,
                   unit_price_cents, discounted_unit_price_cents, line_total_cents
            FROM order_lines
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for row in &rows {
            let (order_id, line) = Self::row_to_line(row)?;
            grouped.entry(order_id).or_default().push(line);
        }
        Ok(grouped)
    }

    /// Conditionally decrements stock on an open connection.
    async fn decrement_stock(conn: &mut PgConnection, movement: &StockMovement) -> Result<u32> {
        let quantity = to_db_quantity(movement.quantity)?;

        let remaining: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity - $2
            WHERE id = $1 AND stock_quantity >= $2
            RETURNING stock_quantity
            "#,
        )
        .bind(movement.product_id.as_str())
        .bind(quantity)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(remaining) = remaining {
            return from_db_quantity(remaining);
        }

        let available: Option<i32> =
            sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = $1")
                .bind(movement.product_id.as_str())
                .fetch_optional(&mut *conn)
                .await?;

        match available {
            None => Err(StoreError::ProductNotFound(movement.product_id.clone())),
            Some(available) => {
                tracing::debug!(
                    product_id = %movement.product_id,
                    available,
                    requested = movement.quantity,
                    "conditional stock decrement rejected"
                );
                Err(StoreError::InsufficientStock {
                    product_id: movement.product_id.clone(),
                    available: from_db_quantity(available)?,
                    requested: movement.quantity,
                })
            }
        }
    }

    async fn increment_stock(conn: &mut PgConnection, movement: &StockMovement) -> Result<u32> {
        let level: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity + $2
            WHERE id = $1
            RETURNING stock_quantity
            "#,
        )
        .bind(movement.product_id.as_str())
        .bind(to_db_quantity(movement.quantity)?)
        .fetch_optional(&mut *conn)
        .await?;

        match level {
            Some(level) => from_db_quantity(level),
            None => Err(StoreError::ProductNotFound(movement.product_id.clone())),
        }
    }
}

fn to_db_quantity(quantity: u32) -> Result<i32> {
    i32::try_from(quantity)
        .map_err(|_| StoreError::InvalidWrite(format!("quantity {quantity} out of range")))
}

fn from_db_quantity(quantity: i32) -> Result<u32> {
    u32::try_from(quantity)
        .map_err(|_| StoreError::Corrupt(format!("negative quantity {quantity}")))
}

fn parse_status(status: &str) -> Result<OrderStatus> {
    status
        .parse()
        .map_err(|e: domain::UnknownOrderStatus| StoreError::Corrupt(e.to_string()))
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    builder.push(" WHERE TRUE");

    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(customer_id) = filter.customer_id {
        builder
            .push(" AND customer_id = ")
            .push_bind(customer_id.as_uuid());
    }
    if let Some(min) = filter.min_total {
        builder.push(" AND total_cents >= ").push_bind(min.cents());
    }
    if let Some(max) = filter.max_total {
        builder.push(" AND total_cents <= ").push_bind(max.cents());
    }
    if let Some(from) = filter.created_from {
        builder.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.created_to {
        builder.push(" AND created_at <= ").push_bind(to);
    }
    if let Some(from) = filter.updated_from {
        builder.push(" AND updated_at >= ").push_bind(from);
    }
    if let Some(to) = filter.updated_to {
        builder.push(" AND updated_at <= ").push_bind(to);
    }
}

#[async_trait]
impl Catalog for PostgresStore {
    async fn get_products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let ids: Vec<String> = ids.iter().map(|id| id.as_str().to_owned()).collect();

        let rows = sqlx::query(
            r#"
            SELECT id, name, price_cents, discount_percent, stock_quantity
            FROM products
            WHERE id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_product).collect()
    }
}

#[async_trait]
impl InventoryLedger for PostgresStore {
    async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<u32> {
        let mut conn = self.pool.acquire().await?;
        Self::decrement_stock(&mut *conn, &StockMovement::reserve(product_id.clone(), quantity))
            .await
    }

    async fn release(&self, product_id: &ProductId, quantity: u32) -> Result<u32> {
        let mut conn = self.pool.acquire().await?;
        Self::increment_stock(&mut *conn, &StockMovement::release(product_id.clone(), quantity))
            .await
    }

    async fn stock_level(&self, product_id: &ProductId) -> Result<Option<u32>> {
        let level: Option<i32> =
            sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = $1")
                .bind(product_id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        level.map(from_db_quantity).transpose()
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    #[tracing::instrument(skip_all, fields(order_id = %order.id()))]
    async fn save(&self, order: &Order, reservations: &[StockMovement]) -> Result<()> {
        validate_new_order(order, reservations)?;

        // Lock product rows in a fixed order so concurrent intakes can't deadlock.
        let mut reservations = reservations.to_vec();
        reservations.sort_by(|a, b| a.product_id.cmp(&b.product_id));

        let mut tx = self.pool.begin().await?;

        let address = order.shipping_address();
        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, status, total_cents, notes,
                                street_number, street_name, city, state, zip_code, country,
                                stock_reserved, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.customer_id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.total_price().cents())
        .bind(order.notes())
        .bind(&address.street_number)
        .bind(&address.street_name)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.zip_code)
        .bind(&address.country)
        .bind(order.stock_reserved())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("orders_pkey")
            {
                return StoreError::DuplicateOrder(order.id());
            }
            StoreError::Database(e)
        })?;

        for movement in &reservations {
            Self::decrement_stock(&mut *tx, movement).await?;
        }

        for (line_no, line) in order.lines().iter().enumerate() {
            let line_no = i32::try_from(line_no)
                .map_err(|_| StoreError::InvalidWrite("too many order lines".to_string()))?;

            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, line_no, product_id, quantity,
                                         discount_percent, unit_price_cents,
                                         discounted_unit_price_cents, line_total_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(order.id().as_uuid())
            .bind(line_no)
            .bind(line.product_id.as_str())
            .bind(to_db_quantity(line.quantity)?)
            .bind(i16::from(line.discount.percent()))
            .bind(line.unit_price.cents())
            .bind(line.discounted_unit_price.cents())
            .bind(line.line_total.cents())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(order_id = %change.order_id, to = %change.to))]
    async fn update(&self, change: &StatusChange) -> Result<()> {
        validate_status_change(change)?;

        let mut tx = self.pool.begin().await?;

        // Compare-and-set: the row lock makes a concurrent writer wait and
        // then re-check the status, so only one of them matches. A restocking
        // write also claims the reservation so it is released at most once.
        let releases_stock = change.releases_stock();
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3,
                updated_at = $4,
                stock_reserved = stock_reserved AND NOT $5
            WHERE id = $1 AND status = $2 AND (stock_reserved OR NOT $5)
            "#,
        )
        .bind(change.order_id.as_uuid())
        .bind(change.from.as_str())
        .bind(change.to.as_str())
        .bind(change.changed_at)
        .bind(releases_stock)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let current: Option<(String, bool)> =
                sqlx::query_as("SELECT status, stock_reserved FROM orders WHERE id = $1")
                    .bind(change.order_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;

            return match current {
                None => Err(StoreError::OrderNotFound(change.order_id)),
                Some((actual, _)) if actual != change.from.as_str() => {
                    Err(StoreError::StatusConflict {
                        order_id: change.order_id,
                        expected: change.from,
                        actual: parse_status(&actual)?,
                    })
                }
                Some(_) => Err(StoreError::ReservationReleased(change.order_id)),
            };
        }

        let mut restock = change.restock.clone();
        restock.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        for movement in &restock {
            Self::increment_stock(&mut *tx, movement).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut lines = self.load_lines(&[order_id.as_uuid()]).await?;
        let lines = lines.remove(&order_id.as_uuid()).unwrap_or_default();
        Self::row_to_order(&row, lines).map(Some)
    }

    async fn list_all(&self, query: &OrderQuery) -> Result<Page<Order>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders");
        push_filter(&mut count, &query.filter);
        let total_count = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let offset = i64::try_from(query.page.offset()).unwrap_or(i64::MAX);
        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {ORDER_COLUMNS} FROM orders"));
        push_filter(&mut select, &query.filter);
        select
            .push(" ORDER BY ")
            .push(query.sort.sql_order_by())
            .push(" LIMIT ")
            .push_bind(i64::from(query.page.size()))
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = select.build().fetch_all(&self.pool).await?;

        let ids: Vec<Uuid> = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<_, _>>()?;
        let mut lines = self.load_lines(&ids).await?;

        let mut items = Vec::with_capacity(rows.len());
        for (row, id) in rows.iter().zip(&ids) {
            let order_lines = lines.remove(id).unwrap_or_default();
            items.push(Self::row_to_order(row, order_lines)?);
        }

        let total_count = u64::try_from(total_count).unwrap_or_default();
        Ok(Page::new(items, total_count, query.page))
    }
}
