use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::category::Category;
use super::ids::CategoryId;
use crate::error::ViewModelError;

/// Input for creating an item. The backend assigns id, owner, timestamps and
/// sets `archived = false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDraft {
    pub name: String,
    /// `None` means no category was picked in the form.
    pub category_id: Option<CategoryId>,
    pub quantity: f64,
    pub unit: String,
    pub reorder_point: f64,
    pub expiration_date: Option<DateTime<Utc>>,
}

impl ItemDraft {
    /// Check the draft against the active category set.
    ///
    /// # Errors
    ///
    /// Returns [`ViewModelError::Validation`] for a blank name, a missing or
    /// unknown category, or a non-finite number.
    pub fn validate(&self, categories: &[Category]) -> Result<(), ViewModelError> {
        validate_name(&self.name)?;
        let Some(category_id) = &self.category_id else {
            return Err(ViewModelError::Validation(
                "please select a valid category".to_string(),
            ));
        };
        validate_category(category_id, categories)?;
        validate_number("quantity", self.quantity)?;
        validate_number("reorder point", self.reorder_point)
    }

    /// Copy with the name trimmed, as it will be stored.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.unit = self.unit.trim().to_string();
        self
    }
}

/// Partial update for an existing item. `None` leaves a field untouched;
/// `expiration_date: Some(None)` clears the date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatch {
    pub name: Option<String>,
    pub category_id: Option<CategoryId>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub reorder_point: Option<f64>,
    pub expiration_date: Option<Option<DateTime<Utc>>>,
}

impl ItemPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category_id.is_none()
            && self.quantity.is_none()
            && self.unit.is_none()
            && self.reorder_point.is_none()
            && self.expiration_date.is_none()
    }

    /// # Errors
    ///
    /// Returns [`ViewModelError::Validation`] when the patch changes nothing
    /// or a provided field is invalid.
    pub fn validate(&self, categories: &[Category]) -> Result<(), ViewModelError> {
        if self.is_empty() {
            return Err(ViewModelError::Validation("nothing to update".to_string()));
        }
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(category_id) = &self.category_id {
            validate_category(category_id, categories)?;
        }
        if let Some(quantity) = self.quantity {
            validate_number("quantity", quantity)?;
        }
        if let Some(reorder_point) = self.reorder_point {
            validate_number("reorder point", reorder_point)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn normalized(mut self) -> Self {
        if let Some(name) = self.name.as_mut() {
            *name = name.trim().to_string();
        }
        if let Some(unit) = self.unit.as_mut() {
            *unit = unit.trim().to_string();
        }
        self
    }
}

fn validate_name(name: &str) -> Result<(), ViewModelError> {
    if name.trim().is_empty() {
        return Err(ViewModelError::Validation("item name is required".to_string()));
    }
    Ok(())
}

fn validate_category(id: &CategoryId, categories: &[Category]) -> Result<(), ViewModelError> {
    if categories.iter().any(|c| &c.id == id && c.is_active) {
        Ok(())
    } else {
        Err(ViewModelError::Validation(
            "please select a valid category".to_string(),
        ))
    }
}

fn validate_number(field: &str, value: f64) -> Result<(), ViewModelError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ViewModelError::Validation(format!("{field} must be a number")))
    }
}
