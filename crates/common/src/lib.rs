//! Shared types for the storefront order core.
//!
//! Identifiers and the money representation used by every other crate.

mod money;
mod types;

pub use money::Money;
pub use types::{CustomerId, OrderId, ProductId};
