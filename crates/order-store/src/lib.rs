//! Persistence for the storefront order core.
//!
//! Defines the ports the order service depends on ([`Catalog`],
//! [`InventoryLedger`], [`OrderStore`]) and two adapters: an in-memory
//! store for tests and local use, and a PostgreSQL store.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::{OrderFilter, OrderQuery, OrderSort, Page, PageRequest};
pub use store::{Catalog, InventoryLedger, OrderStore, OrderStoreExt};
