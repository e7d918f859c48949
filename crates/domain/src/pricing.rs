//! Pricing engine.
//!
//! Converts a product's list price and discount tier into the frozen
//! per-unit and per-line amounts recorded on an order line.

use serde::{Deserialize, Serialize};

use crate::{Money, Product};

/// Prices computed for one order line at the moment of sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinePrice {
    pub unit_price: Money,
    pub discounted_unit_price: Money,
    pub line_total: Money,
}

/// Prices `quantity` units of `product` at its current list price and tier.
///
/// Returns None when the line total does not fit in a [`Money`].
pub fn price(product: &Product, quantity: u32) -> Option<LinePrice> {
    let unit_price = product.price;
    let discount = unit_price.checked_percent(product.discount.percent())?;
    let discounted_unit_price = unit_price.checked_sub(discount)?;

    Some(LinePrice {
        unit_price,
        discounted_unit_price,
        line_total: discounted_unit_price.checked_multiply(quantity)?,
    })
}
