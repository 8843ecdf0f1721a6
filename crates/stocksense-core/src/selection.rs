//! Client-local multi-select over the visible rows.
//!
//! Every mutating method takes the currently visible ids and keeps the
//! selection a subset of them.

use std::collections::BTreeSet;

use crate::model::ItemId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: BTreeSet<ItemId>,
}

impl Selection {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ids: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &ItemId) -> bool {
        self.ids.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemId> {
        self.ids.iter()
    }

    /// Flip membership of `id`. Ids that are not visible are ignored.
    /// Returns whether `id` is selected afterwards.
    pub fn toggle<'a>(&mut self, id: &ItemId, visible: impl IntoIterator<Item = &'a ItemId>) -> bool {
        if self.ids.remove(id) {
            return false;
        }
        if visible.into_iter().any(|v| v == id) {
            self.ids.insert(id.clone());
            true
        } else {
            false
        }
    }

    /// Select exactly the visible ids, or clear if they are all selected already.
    pub fn select_all<'a>(&mut self, visible: impl IntoIterator<Item = &'a ItemId>) {
        let visible: BTreeSet<ItemId> = visible.into_iter().cloned().collect();
        if !visible.is_empty() && visible.is_subset(&self.ids) && self.ids.len() == visible.len() {
            self.ids.clear();
        } else {
            self.ids = visible;
        }
    }

    /// Whether every visible id is selected (and at least one is visible).
    #[must_use]
    pub fn all_selected<'a>(&self, visible: impl IntoIterator<Item = &'a ItemId>) -> bool {
        let mut any = false;
        for id in visible {
            any = true;
            if !self.ids.contains(id) {
                return false;
            }
        }
        any
    }

    /// Drop ids that are no longer visible. Returns how many were dropped.
    pub fn retain_visible<'a>(&mut self, visible: impl IntoIterator<Item = &'a ItemId>) -> usize {
        if self.ids.is_empty() {
            return 0;
        }
        let visible: BTreeSet<&ItemId> = visible.into_iter().collect();
        let before = self.ids.len();
        self.ids.retain(|id| visible.contains(id));
        before - self.ids.len()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}
