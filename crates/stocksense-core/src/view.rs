//! Derived view: category filter plus client-side sort over the canonical list.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::model::{Category, CategoryId, InventoryItem};

/// Sort field for the item list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    Name,
    /// By resolved category name; dangling categories sort last.
    Category,
    Quantity,
    ReorderPoint,
    LastUpdated,
    ExpirationDate,
}

impl SortField {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Category => "category",
            Self::Quantity => "quantity",
            Self::ReorderPoint => "reorderPoint",
            Self::LastUpdated => "lastUpdated",
            Self::ExpirationDate => "expirationDate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

/// Which categories are visible.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(CategoryId),
}

impl CategoryFilter {
    #[must_use]
    pub fn matches(&self, item: &InventoryItem) -> bool {
        match self {
            Self::All => true,
            Self::Only(id) => &item.category_id == id,
        }
    }
}

/// Client-local view settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewState {
    pub sort_field: SortField,
    pub direction: SortDirection,
    pub category_filter: CategoryFilter,
}

/// A sortable value extracted from an item. `None` means missing.
enum SortKey<'a> {
    Text(Option<&'a str>),
    Number(Option<f64>),
    Time(Option<i64>),
}

fn sort_key<'a>(item: &'a InventoryItem, field: SortField, categories: &'a [Category]) -> SortKey<'a> {
    match field {
        SortField::Name => {
            SortKey::Text(Some(item.name.as_str()).filter(|n| !n.trim().is_empty()))
        }
        SortField::Category => SortKey::Text(
            categories
                .iter()
                .find(|c| c.id == item.category_id)
                .map(|c| c.name.as_str()),
        ),
        SortField::Quantity => SortKey::Number(Some(item.quantity).filter(|q| !q.is_nan())),
        SortField::ReorderPoint => {
            SortKey::Number(Some(item.reorder_point).filter(|q| !q.is_nan()))
        }
        SortField::LastUpdated => SortKey::Time(Some(item.last_updated.timestamp_micros())),
        SortField::ExpirationDate => {
            SortKey::Time(item.expiration_date.map(|d| d.timestamp_micros()))
        }
    }
}

/// Missing values sort last regardless of direction; direction only applies
/// between two present values.
fn missing_last<T>(
    a: Option<T>,
    b: Option<T>,
    direction: SortDirection,
    cmp: impl FnOnce(&T, &T) -> Ordering,
) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match direction {
            SortDirection::Asc => cmp(&a, &b),
            SortDirection::Desc => cmp(&b, &a),
        },
    }
}

/// Compare two items under `field`/`direction`. Ties compare equal.
#[must_use]
pub fn compare_items(
    a: &InventoryItem,
    b: &InventoryItem,
    field: SortField,
    direction: SortDirection,
    categories: &[Category],
) -> Ordering {
    match (sort_key(a, field, categories), sort_key(b, field, categories)) {
        (SortKey::Text(x), SortKey::Text(y)) => missing_last(x, y, direction, |x, y| x.cmp(y)),
        (SortKey::Number(x), SortKey::Number(y)) => missing_last(x, y, direction, |x, y| {
            x.partial_cmp(y).unwrap_or(Ordering::Equal)
        }),
        (SortKey::Time(x), SortKey::Time(y)) => missing_last(x, y, direction, |x, y| x.cmp(y)),
        _ => Ordering::Equal,
    }
}

/// Stable sort: ties keep snapshot order.
pub fn sort_items(
    items: &mut [&InventoryItem],
    field: SortField,
    direction: SortDirection,
    categories: &[Category],
) {
    items.sort_by(|a, b| compare_items(a, b, field, direction, categories));
}

/// Filter then sort the canonical list into the rows the UI renders.
#[must_use]
pub fn derive_view<'a>(
    items: &'a [InventoryItem],
    state: &ViewState,
    categories: &[Category],
) -> Vec<&'a InventoryItem> {
    let mut visible: Vec<&InventoryItem> = items
        .iter()
        .filter(|item| state.category_filter.matches(item))
        .collect();
    sort_items(&mut visible, state.sort_field, state.direction, categories);
    visible
}
