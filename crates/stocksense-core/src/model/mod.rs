//! Fixed-shape records held by the view-model.

pub mod category;
pub mod draft;
pub mod ids;
pub mod item;

pub use category::{Category, CategoryColor, DEFAULT_COLORS, UNCATEGORIZED, category_name};
pub use draft::{ItemDraft, ItemPatch};
pub use ids::{CategoryId, ItemId, OwnerId};
pub use item::{InventoryItem, StockStatus};
