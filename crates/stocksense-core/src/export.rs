//! Export rows built from the current selection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::ViewModelError;
use crate::model::{Category, InventoryItem, StockStatus, category_name};
use crate::selection::Selection;

/// One flat spreadsheet row. Serialized field names are the column headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    #[serde(rename = "Item Name")]
    pub name: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Quantity")]
    pub quantity: f64,
    #[serde(rename = "Reorder Point")]
    pub reorder_point: f64,
    #[serde(rename = "Status")]
    pub status: StockStatus,
    #[serde(rename = "Last Updated")]
    pub last_updated: DateTime<Utc>,
}

impl ExportRow {
    #[must_use]
    pub fn from_item(item: &InventoryItem, categories: &[Category]) -> Self {
        Self {
            name: item.name.clone(),
            category: category_name(categories, &item.category_id).to_string(),
            quantity: item.quantity,
            reorder_point: item.reorder_point,
            status: item.status(),
            last_updated: item.last_updated,
        }
    }
}

/// Format hint passed through to the exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xlsx => f.write_str("xlsx"),
            Self::Csv => f.write_str("csv"),
        }
    }
}

/// Turns rows into a downloadable file.
pub trait Exporter {
    type Error: fmt::Display;

    /// # Errors
    ///
    /// Returns the exporter's own error when the file cannot be produced.
    fn write(&mut self, rows: &[ExportRow], format: ExportFormat) -> Result<(), Self::Error>;
}

/// Resolve the selection against the canonical list, in list order.
///
/// Selected ids missing from `items` are skipped.
///
/// # Errors
///
/// [`ViewModelError::EmptySelection`] when nothing is selected, and
/// [`ViewModelError::NothingToExport`] when none of the selected ids still
/// exist.
pub fn build_export_rows(
    selection: &Selection,
    items: &[InventoryItem],
    categories: &[Category],
) -> Result<Vec<ExportRow>, ViewModelError> {
    if selection.is_empty() {
        return Err(ViewModelError::EmptySelection);
    }
    let rows: Vec<ExportRow> = items
        .iter()
        .filter(|item| selection.contains(&item.id))
        .map(|item| ExportRow::from_item(item, categories))
        .collect();
    if rows.is_empty() {
        return Err(ViewModelError::NothingToExport);
    }
    let skipped = selection.len().saturating_sub(rows.len());
    if skipped > 0 {
        debug!(skipped, "selected items no longer present; skipped in export");
    }
    Ok(rows)
}
