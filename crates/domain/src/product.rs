//! Catalog product as seen by the order core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Money, ProductId};

/// A percentage-off tier attached to a product.
///
/// Valid tiers run from 0 to 100 in steps of 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DiscountTier(u8);

/// Returned when an integer is not a valid discount tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid discount tier: {0} (must be 0-100 in steps of 5)")]
pub struct InvalidDiscountTier(pub i64);

impl DiscountTier {
    pub const NONE: DiscountTier = DiscountTier(0);
    pub const FIVE_PERCENT: DiscountTier = DiscountTier(5);
    pub const TEN_PERCENT: DiscountTier = DiscountTier(10);
    pub const FIFTEEN_PERCENT: DiscountTier = DiscountTier(15);
    pub const TWENTY_PERCENT: DiscountTier = DiscountTier(20);
    pub const TWENTY_FIVE_PERCENT: DiscountTier = DiscountTier(25);
    pub const FIFTY_PERCENT: DiscountTier = DiscountTier(50);
    pub const ONE_HUNDRED_PERCENT: DiscountTier = DiscountTier(100);

    /// Creates a tier from a percentage, rejecting off-step values.
    pub fn new(percent: u8) -> Result<Self, InvalidDiscountTier> {
        if percent <= 100 && percent % 5 == 0 {
            Ok(Self(percent))
        } else {
            Err(InvalidDiscountTier(i64::from(percent)))
        }
    }

    /// Returns the percentage taken off the list price.
    pub fn percent(&self) -> u8 {
        self.0
    }

    /// Iterates over every valid tier, lowest first.
    pub fn all() -> impl Iterator<Item = DiscountTier> {
        (0..=100u8).step_by(5).map(DiscountTier)
    }
}

impl TryFrom<u8> for DiscountTier {
    type Error = InvalidDiscountTier;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<i16> for DiscountTier {
    type Error = InvalidDiscountTier;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| InvalidDiscountTier(i64::from(value)))
            .and_then(Self::new)
    }
}

impl From<DiscountTier> for u8 {
    fn from(tier: DiscountTier) -> Self {
        tier.0
    }
}

impl std::fmt::Display for DiscountTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Current catalog record for a product.
///
/// Owned by the catalog; the order core only reads it. Stock changes go
/// through the inventory ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// List price per unit.
    pub price: Money,
    pub discount: DiscountTier,
    pub stock_quantity: u32,
}

impl Product {
    pub fn new(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        price: Money,
        discount: DiscountTier,
        stock_quantity: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            discount,
            stock_quantity,
        }
    }
}
