//! Category directory and the in-memory category book.
//!
//! The view-model only reads categories. [`CategoryBook`] owns their
//! lifecycle for hosts (and the simulator) that have no hosted directory.

use tracing::{debug, info};

use crate::config::CategoryLimits;
use crate::error::ErrorCode;
use crate::model::{Category, CategoryId, DEFAULT_COLORS};

/// Supplies the active category set, ordered for display.
pub trait CategoryDirectory {
    /// Active categories in `sort_order`. Inactive entries are excluded.
    fn active_categories(&self) -> Vec<Category>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CategoryError {
    #[error("category name must be between {min} and {max} characters")]
    InvalidName { min: usize, max: usize },

    #[error("a category named '{0}' already exists")]
    DuplicateName(String),

    #[error("maximum number of categories ({0}) reached")]
    LimitReached(usize),

    #[error("category '{0}' not found")]
    NotFound(CategoryId),

    #[error("cannot delete default category")]
    DefaultCategory,

    #[error("cannot delete category with {0} associated items")]
    InUse(usize),

    #[error("reorder list must name every category exactly once")]
    InvalidOrder,
}

impl CategoryError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidName { .. } | Self::InvalidOrder => ErrorCode::ValidationFailed,
            Self::DuplicateName(_) | Self::DefaultCategory | Self::InUse(_) => {
                ErrorCode::CategoryConflict
            }
            Self::LimitReached(_) => ErrorCode::CategoryLimitReached,
            Self::NotFound(_) => ErrorCode::CategoryNotFound,
        }
    }
}

/// One user's categories, held in memory.
#[derive(Debug, Clone, Default)]
pub struct CategoryBook {
    categories: Vec<Category>,
    limits: CategoryLimits,
    next_id: u64,
}

impl CategoryBook {
    #[must_use]
    pub fn new(limits: CategoryLimits) -> Self {
        Self {
            categories: Vec::new(),
            limits,
            next_id: 0,
        }
    }

    /// A book seeded with the stock default categories, which cannot be deleted.
    #[must_use]
    pub fn with_defaults(limits: CategoryLimits) -> Self {
        let mut book = Self::new(limits);
        for (index, (id, name, color)) in [
            ("produce", "Produce", DEFAULT_COLORS[2].value),
            ("meat", "Meat", DEFAULT_COLORS[0].value),
            ("dairy", "Dairy", DEFAULT_COLORS[3].value),
            ("dry-goods", "Dry Goods", DEFAULT_COLORS[1].value),
        ]
        .into_iter()
        .enumerate()
        {
            let mut category = Category::new(id, name, color);
            category.is_default = true;
            category.sort_order = u32::try_from(index).unwrap_or(u32::MAX);
            book.categories.push(category);
        }
        book
    }

    #[must_use]
    pub fn get(&self, id: &CategoryId) -> Option<&Category> {
        self.categories.iter().find(|c| &c.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    fn active_count(&self) -> usize {
        self.categories.iter().filter(|c| c.is_active).count()
    }

    fn check_name(&self, name: &str, except: Option<&CategoryId>) -> Result<String, CategoryError> {
        let trimmed = name.trim();
        let len = trimmed.chars().count();
        if len < self.limits.name_min_len || len > self.limits.name_max_len {
            return Err(CategoryError::InvalidName {
                min: self.limits.name_min_len,
                max: self.limits.name_max_len,
            });
        }
        let lowered = trimmed.to_lowercase();
        if self
            .categories
            .iter()
            .filter(|c| except != Some(&c.id))
            .any(|c| c.name.to_lowercase() == lowered)
        {
            return Err(CategoryError::DuplicateName(trimmed.to_string()));
        }
        Ok(trimmed.to_string())
    }

    /// Add a category at the end of the display order.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range or duplicate name, or when the per-user
    /// limit is reached.
    pub fn add(&mut self, name: &str, color: &str) -> Result<CategoryId, CategoryError> {
        if self.active_count() >= self.limits.max_per_user {
            return Err(CategoryError::LimitReached(self.limits.max_per_user));
        }
        let name = self.check_name(name, None)?;
        self.next_id += 1;
        let id = CategoryId::new(format!("cat-{}", self.next_id));
        let mut category = Category::new(id.clone(), name, color);
        category.sort_order = u32::try_from(self.categories.len()).unwrap_or(u32::MAX);
        info!(category = %id, name = %category.name, "category added");
        self.categories.push(category);
        Ok(id)
    }

    /// # Errors
    ///
    /// Fails if the category does not exist or the new name is invalid.
    pub fn rename(&mut self, id: &CategoryId, name: &str) -> Result<(), CategoryError> {
        if self.get(id).is_none() {
            return Err(CategoryError::NotFound(id.clone()));
        }
        let name = self.check_name(name, Some(id))?;
        if let Some(category) = self.categories.iter_mut().find(|c| &c.id == id) {
            category.name = name;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Fails if the category does not exist.
    pub fn set_color(&mut self, id: &CategoryId, color: &str) -> Result<(), CategoryError> {
        let category = self
            .categories
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| CategoryError::NotFound(id.clone()))?;
        category.color = color.to_string();
        Ok(())
    }

    /// Delete a category. `items_using` is the number of items, in either
    /// partition, that still reference it.
    ///
    /// # Errors
    ///
    /// Fails for unknown ids, default categories, and categories in use.
    pub fn delete(&mut self, id: &CategoryId, items_using: usize) -> Result<(), CategoryError> {
        let category = self
            .get(id)
            .ok_or_else(|| CategoryError::NotFound(id.clone()))?;
        if category.is_default {
            return Err(CategoryError::DefaultCategory);
        }
        if items_using > 0 {
            return Err(CategoryError::InUse(items_using));
        }
        self.categories.retain(|c| &c.id != id);
        debug!(category = %id, "category deleted");
        Ok(())
    }

    /// Assign `sort_order` by position in `ordered`.
    ///
    /// # Errors
    ///
    /// Fails unless `ordered` names every category exactly once; nothing is
    /// changed in that case.
    pub fn reorder(&mut self, ordered: &[CategoryId]) -> Result<(), CategoryError> {
        if ordered.len() != self.categories.len() {
            return Err(CategoryError::InvalidOrder);
        }
        let mut positions = Vec::with_capacity(ordered.len());
        for category in &self.categories {
            let position = ordered
                .iter()
                .position(|id| id == &category.id)
                .ok_or(CategoryError::InvalidOrder)?;
            positions.push(position);
        }
        for (category, position) in self.categories.iter_mut().zip(positions) {
            category.sort_order = u32::try_from(position).unwrap_or(u32::MAX);
        }
        Ok(())
    }
}

impl CategoryDirectory for CategoryBook {
    fn active_categories(&self) -> Vec<Category> {
        let mut active: Vec<Category> = self
            .categories
            .iter()
            .filter(|c| c.is_active)
            .cloned()
            .collect();
        active.sort_by_key(|c| c.sort_order);
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> CategoryBook {
        CategoryBook::with_defaults(CategoryLimits::default())
    }

    fn names(book: &CategoryBook) -> Vec<String> {
        book.active_categories().into_iter().map(|c| c.name).collect()
    }

    #[test]
    fn defaults_are_ordered() {
        assert_eq!(names(&book()), vec!["Produce", "Meat", "Dairy", "Dry Goods"]);
    }

    #[test]
    fn add_trims_and_appends() {
        let mut book = book();
        let id = book.add("  Frozen ", "#6366F1").expect("add");
        assert_eq!(book.get(&id).map(|c| c.name.as_str()), Some("Frozen"));
        assert_eq!(names(&book).last().map(String::as_str), Some("Frozen"));
    }

    #[test]
    fn duplicate_names_are_case_insensitive() {
        let mut book = book();
        assert_eq!(
            book.add("dairy", "#000"),
            Err(CategoryError::DuplicateName("dairy".into()))
        );
    }

    #[test]
    fn name_length_is_bounded() {
        let mut book = book();
        assert!(matches!(
            book.add("x", "#000"),
            Err(CategoryError::InvalidName { min: 2, max: 30 })
        ));
        assert!(book.add(&"y".repeat(31), "#000").is_err());
        assert!(book.add(&"y".repeat(30), "#000").is_ok());
    }

    #[test]
    fn limit_is_enforced() {
        let mut book = CategoryBook::new(CategoryLimits {
            max_per_user: 2,
            ..CategoryLimits::default()
        });
        book.add("One", "#000").expect("first");
        book.add("Two", "#000").expect("second");
        let err = book.add("Three", "#000").expect_err("limit");
        assert_eq!(err.code(), ErrorCode::CategoryLimitReached);
    }

    #[test]
    fn default_and_in_use_categories_cannot_be_deleted() {
        let mut book = book();
        assert_eq!(
            book.delete(&CategoryId::new("meat"), 0),
            Err(CategoryError::DefaultCategory)
        );
        let id = book.add("Frozen", "#000").expect("add");
        assert_eq!(book.delete(&id, 3), Err(CategoryError::InUse(3)));
        book.delete(&id, 0).expect("delete");
        assert!(book.get(&id).is_none());
    }

    #[test]
    fn rename_may_keep_own_name_with_new_case() {
        let mut book = book();
        book.rename(&CategoryId::new("dairy"), "DAIRY").expect("rename");
        assert!(book.rename(&CategoryId::new("dairy"), "Meat").is_err());
    }

    #[test]
    fn reorder_sets_sort_order() {
        let mut book = book();
        let order: Vec<CategoryId> = ["dry-goods", "dairy", "meat", "produce"]
            .into_iter()
            .map(CategoryId::new)
            .collect();
        book.reorder(&order).expect("reorder");
        assert_eq!(names(&book), vec!["Dry Goods", "Dairy", "Meat", "Produce"]);
    }

    #[test]
    fn reorder_rejects_partial_lists() {
        let mut book = book();
        let before = names(&book);
        assert_eq!(
            book.reorder(&[CategoryId::new("meat")]),
            Err(CategoryError::InvalidOrder)
        );
        assert_eq!(names(&book), before);
    }

    #[test]
    fn inactive_categories_are_hidden() {
        let mut book = book();
        if let Some(c) = book.categories.iter_mut().find(|c| c.id.as_str() == "meat") {
            c.is_active = false;
        }
        assert!(!names(&book).contains(&"Meat".to_string()));
    }
}
