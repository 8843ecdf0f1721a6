//! Dashboard counts and stock alerts derived from the canonical list.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::model::{Category, InventoryItem, ItemId, StockStatus, category_name};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySummary {
    pub total: usize,
    pub in_stock: usize,
    pub low_stock: usize,
    pub out_of_stock: usize,
    pub expiring_soon: usize,
    pub expired: usize,
    /// Item count per resolved category name.
    pub per_category: BTreeMap<String, usize>,
}

impl InventorySummary {
    #[must_use]
    pub fn compute(
        items: &[InventoryItem],
        categories: &[Category],
        now: DateTime<Utc>,
        expiring_within_days: i64,
    ) -> Self {
        let window = expiry_window(expiring_within_days);
        let mut summary = Self {
            total: items.len(),
            ..Self::default()
        };
        for item in items {
            match item.status() {
                StockStatus::InStock => summary.in_stock += 1,
                StockStatus::LowStock => summary.low_stock += 1,
                StockStatus::OutOfStock => summary.out_of_stock += 1,
            }
            match expiry(item, now, window) {
                Some(Expiry::Expired) => summary.expired += 1,
                Some(Expiry::Soon { .. }) => summary.expiring_soon += 1,
                None => {}
            }
            *summary
                .per_category
                .entry(category_name(categories, &item.category_id).to_string())
                .or_insert(0) += 1;
        }
        summary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum AlertKind {
    OutOfStock,
    LowStock,
    Expired,
    ExpiringSoon { days_remaining: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAlert {
    pub item_id: ItemId,
    pub kind: AlertKind,
    pub priority: AlertPriority,
    pub message: String,
}

/// Window for "expiring soon", saturating at the representable range.
fn expiry_window(days: i64) -> Duration {
    Duration::try_days(days).unwrap_or(if days < 0 {
        Duration::MIN
    } else {
        Duration::MAX
    })
}

enum Expiry {
    Expired,
    Soon { days_remaining: i64 },
}

fn expiry(item: &InventoryItem, now: DateTime<Utc>, window: Duration) -> Option<Expiry> {
    let expires = item.expiration_date?;
    if expires <= now {
        return Some(Expiry::Expired);
    }
    let left = expires - now;
    (left <= window).then(|| Expiry::Soon {
        days_remaining: (left.num_hours() + 23) / 24,
    })
}

/// Alerts for every item that needs attention, most urgent first.
///
/// An item can raise one stock alert and one expiry alert.
#[must_use]
pub fn stock_alerts(
    items: &[InventoryItem],
    now: DateTime<Utc>,
    expiring_within_days: i64,
) -> Vec<StockAlert> {
    let window = expiry_window(expiring_within_days);
    let mut alerts = Vec::new();
    for item in items {
        match item.status() {
            StockStatus::OutOfStock => alerts.push(StockAlert {
                item_id: item.id.clone(),
                kind: AlertKind::OutOfStock,
                priority: AlertPriority::High,
                message: format!("{} is out of stock", item.name),
            }),
            StockStatus::LowStock => alerts.push(StockAlert {
                item_id: item.id.clone(),
                kind: AlertKind::LowStock,
                priority: AlertPriority::Medium,
                message: format!(
                    "{} is running low ({} {} left)",
                    item.name, item.quantity, item.unit
                ),
            }),
            StockStatus::InStock => {}
        }
        match expiry(item, now, window) {
            Some(Expiry::Expired) => alerts.push(StockAlert {
                item_id: item.id.clone(),
                kind: AlertKind::Expired,
                priority: AlertPriority::High,
                message: format!("{} has expired", item.name),
            }),
            Some(Expiry::Soon { days_remaining }) => alerts.push(StockAlert {
                item_id: item.id.clone(),
                kind: AlertKind::ExpiringSoon { days_remaining },
                priority: if days_remaining <= 2 {
                    AlertPriority::Medium
                } else {
                    AlertPriority::Low
                },
                message: match days_remaining {
                    1 => format!("{} expires in 1 day", item.name),
                    n => format!("{} expires in {n} days", item.name),
                },
            }),
            None => {}
        }
    }
    alerts.sort_by_key(|a| a.priority);
    alerts
}
