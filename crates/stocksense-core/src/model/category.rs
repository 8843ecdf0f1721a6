use serde::{Deserialize, Serialize};

use super::ids::CategoryId;

/// Display name used when an item references a category that no longer exists.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// A named swatch offered when creating a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryColor {
    pub id: &'static str,
    pub value: &'static str,
    pub label: &'static str,
}

pub const DEFAULT_COLORS: [CategoryColor; 8] = [
    CategoryColor { id: "1", value: "#EF4444", label: "Red" },
    CategoryColor { id: "2", value: "#F59E0B", label: "Orange" },
    CategoryColor { id: "3", value: "#10B981", label: "Green" },
    CategoryColor { id: "4", value: "#3B82F6", label: "Blue" },
    CategoryColor { id: "5", value: "#6366F1", label: "Indigo" },
    CategoryColor { id: "6", value: "#8B5CF6", label: "Purple" },
    CategoryColor { id: "7", value: "#EC4899", label: "Pink" },
    CategoryColor { id: "8", value: "#6B7280", label: "Gray" },
];

/// A category entry as supplied by the category directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub color: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub sort_order: u32,
}

impl Category {
    #[must_use]
    pub fn new(id: impl Into<CategoryId>, name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: color.into(),
            is_active: true,
            is_default: false,
            sort_order: 0,
        }
    }
}

/// Resolve a category id to its display name, falling back to [`UNCATEGORIZED`].
#[must_use]
pub fn category_name<'a>(categories: &'a [Category], id: &CategoryId) -> &'a str {
    categories
        .iter()
        .find(|c| &c.id == id)
        .map_or(UNCATEGORIZED, |c| c.name.as_str())
}

const fn default_active() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dangling_category_resolves_to_uncategorized() {
        let cats = vec![Category::new("dairy", "Dairy", "#3B82F6")];
        assert_eq!(category_name(&cats, &CategoryId::new("dairy")), "Dairy");
        assert_eq!(category_name(&cats, &CategoryId::new("gone")), UNCATEGORIZED);
    }

    #[test]
    fn missing_flags_default_to_active_non_default() {
        let cat: Category =
            serde_json::from_str(r##"{"id":"meat","name":"Meat","color":"#EF4444"}"##)
                .expect("parse");
        assert!(cat.is_active);
        assert!(!cat.is_default);
        assert_eq!(cat.sort_order, 0);
    }

    #[test]
    fn default_palette_has_unique_values() {
        let mut values: Vec<_> = DEFAULT_COLORS.iter().map(|c| c.value).collect();
        values.sort_unstable();
        values.dedup();
        assert_eq!(values.len(), DEFAULT_COLORS.len());
    }
}
