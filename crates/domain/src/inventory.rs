//! Inventory ledger arithmetic.
//!
//! Stock is decremented by reservations when an order is placed and
//! incremented by releases when an order is canceled. The functions here
//! decide the outcome of a single movement; persistence adapters apply them
//! atomically against the stored counter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ProductId;

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementKind {
    /// Decrement stock to back an order.
    Reserve,
    /// Restore stock from a canceled order.
    Release,
}

/// A quantity moving into or out of one product's stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub product_id: ProductId,
    pub kind: MovementKind,
    pub quantity: u32,
}

/// A reservation asked for more units than were available.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
pub struct StockShortfall {
    pub product_id: ProductId,
    pub available: u32,
    pub requested: u32,
}

impl StockMovement {
    pub fn reserve(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            kind: MovementKind::Reserve,
            quantity,
        }
    }

    pub fn release(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            kind: MovementKind::Release,
            quantity,
        }
    }

    /// Applies this movement to a stock level, returning the new level.
    ///
    /// Reservations never take stock below zero.
    pub fn apply_to(&self, stock: u32) -> Result<u32, StockShortfall> {
        match self.kind {
            MovementKind::Reserve => {
                stock
                    .checked_sub(self.quantity)
                    .ok_or_else(|| StockShortfall {
                        product_id: self.product_id.clone(),
                        available: stock,
                        requested: self.quantity,
                    })
            }
            MovementKind::Release => Ok(stock.saturating_add(self.quantity)),
        }
    }

    /// Signed change to the stock counter.
    pub fn delta(&self) -> i64 {
        match self.kind {
            MovementKind::Reserve => -i64::from(self.quantity),
            MovementKind::Release => i64::from(self.quantity),
        }
    }
}

/// Merges per-line quantities into one movement per product.
///
/// The result is sorted by product ID so adapters lock rows in a
/// deterministic order.
pub fn consolidate<'a>(
    kind: MovementKind,
    lines: impl IntoIterator<Item = (&'a ProductId, u32)>,
) -> Vec<StockMovement> {
    let mut totals: BTreeMap<&ProductId, u32> = BTreeMap::new();
    for (product_id, quantity) in lines {
        let total = totals.entry(product_id).or_default();
        *total = total.saturating_add(quantity);
    }

    totals
        .into_iter()
        .map(|(product_id, quantity)| StockMovement {
            product_id: product_id.clone(),
            kind,
            quantity,
        })
        .collect()
}
