//! Value objects for the order domain.

use serde::{Deserialize, Serialize};

use crate::pricing::LinePrice;
use crate::{CustomerId, DiscountTier, Money, ProductId};

/// Shipping address captured when the order is placed.
///
/// Stored as a copy; later edits to the customer's address book do not
/// reach existing orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub street_number: String,
    pub street_name: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

/// A line of a placed order with its prices frozen at the time of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// The product this line refers to.
    pub product_id: ProductId,

    /// Quantity ordered. Fixed after creation.
    pub quantity: u32,

    /// Discount tier the product carried at the time of sale.
    pub discount: DiscountTier,

    /// List price per unit at the time of sale.
    pub unit_price: Money,

    /// Price per unit after the discount tier was applied.
    pub discounted_unit_price: Money,

    /// Discounted unit price times quantity.
    pub line_total: Money,
}

impl OrderLine {
    /// Builds a line from the prices computed by the pricing engine.
    pub fn priced(
        product_id: ProductId,
        quantity: u32,
        discount: DiscountTier,
        price: LinePrice,
    ) -> Self {
        Self {
            product_id,
            quantity,
            discount,
            unit_price: price.unit_price,
            discounted_unit_price: price.discounted_unit_price,
            line_total: price.line_total,
        }
    }
}

/// A requested product and quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl LineRequest {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Everything needed to place a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub customer_id: CustomerId,
    pub shipping_address: ShippingAddress,
    /// Lines in the order they should appear on the placed order.
    pub lines: Vec<LineRequest>,
    pub notes: Option<String>,
}

impl PlaceOrder {
    pub fn new(
        customer_id: CustomerId,
        shipping_address: ShippingAddress,
        lines: Vec<LineRequest>,
    ) -> Self {
        Self {
            customer_id,
            shipping_address,
            lines,
            notes: None,
        }
    }

    /// Attaches free-text notes to the order.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Returns the distinct product IDs referenced, in first-seen order.
    pub fn product_ids(&self) -> Vec<ProductId> {
        let mut ids: Vec<ProductId> = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            if !ids.contains(&line.product_id) {
                ids.push(line.product_id.clone());
            }
        }
        ids
    }
}
