use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{CategoryId, ItemId, OwnerId};

/// Three-way stock classification shown next to every item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StockStatus {
    #[serde(rename = "Out of Stock")]
    OutOfStock,
    #[serde(rename = "Low Stock")]
    LowStock,
    #[serde(rename = "In Stock")]
    InStock,
}

impl StockStatus {
    /// Classify a quantity against its reorder point.
    ///
    /// - `quantity <= 0` → out of stock
    /// - `quantity <= reorder_point` → low stock
    /// - otherwise → in stock
    #[must_use]
    pub fn classify(quantity: f64, reorder_point: f64) -> Self {
        if quantity <= 0.0 {
            Self::OutOfStock
        } else if quantity <= reorder_point {
            Self::LowStock
        } else {
            Self::InStock
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OutOfStock => "Out of Stock",
            Self::LowStock => "Low Stock",
            Self::InStock => "In Stock",
        }
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized inventory record as last pushed by the live feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: ItemId,
    pub name: String,
    pub category_id: CategoryId,
    pub quantity: f64,
    pub unit: String,
    pub reorder_point: f64,
    pub expiration_date: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
    pub archived: bool,
    pub owner_id: OwnerId,
}

impl InventoryItem {
    #[must_use]
    pub fn status(&self) -> StockStatus {
        StockStatus::classify(self.quantity, self.reorder_point)
    }

    /// Low stock in the broad sense: at or below the reorder point, including empty.
    #[must_use]
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.reorder_point
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_quantity_is_out_of_stock() {
        assert_eq!(StockStatus::classify(0.0, 5.0), StockStatus::OutOfStock);
    }

    #[test]
    fn quantity_at_reorder_point_is_low_stock() {
        assert_eq!(StockStatus::classify(5.0, 5.0), StockStatus::LowStock);
    }

    #[test]
    fn quantity_above_reorder_point_is_in_stock() {
        assert_eq!(StockStatus::classify(6.0, 5.0), StockStatus::InStock);
    }

    #[test]
    fn negative_quantity_is_out_of_stock_even_with_negative_threshold() {
        assert_eq!(StockStatus::classify(-2.0, -5.0), StockStatus::OutOfStock);
    }

    #[test]
    fn status_serializes_as_display_label() {
        let json = serde_json::to_string(&StockStatus::LowStock).expect("serialize");
        assert_eq!(json, "\"Low Stock\"");
        assert_eq!(StockStatus::InStock.to_string(), "In Stock");
    }
}
