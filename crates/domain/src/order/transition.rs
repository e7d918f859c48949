//! Status transitions produced by the order aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OrderId, StockMovement};

use super::OrderStatus;

/// The lifecycle operation that requested a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusOperation {
    /// Administrative, unconditional status write.
    SetStatus,
    AdminCancel,
    CustomerCancel,
    Refund,
}

impl StatusOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusOperation::SetStatus => "set status",
            StatusOperation::AdminCancel => "admin cancel",
            StatusOperation::CustomerCancel => "customer cancel",
            StatusOperation::Refund => "refund",
        }
    }
}

impl std::fmt::Display for StatusOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated status change, ready to be persisted.
///
/// `from` is the status the change was validated against; stores must
/// only write it if the order still has that status. `restock` lists the
/// stock to restore in the same transaction; a non-empty restock also
/// releases the order's reservation, which stores must check is still held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub order_id: OrderId,
    pub operation: StatusOperation,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub changed_at: DateTime<Utc>,
    pub restock: Vec<StockMovement>,
}

impl StatusChange {
    /// Returns true if this change gives the order's reserved stock back.
    pub fn releases_stock(&self) -> bool {
        !self.restock.is_empty()
    }
}
