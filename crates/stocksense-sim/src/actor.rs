//! Random user driving the view-model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use stocksense_core::backend::Backend;
use stocksense_core::export::ExportFormat;
use stocksense_core::feed::LiveFeed;
use stocksense_core::memory::CollectingExporter;
use stocksense_core::model::{CategoryId, ItemDraft, ItemId, ItemPatch, OwnerId};
use stocksense_core::view::{CategoryFilter, SortField};
use stocksense_core::{DeleteConfirmation, Dispatch, InventoryViewModel};

use crate::rng::DeterministicRng;

pub const OWNERS: [&str; 2] = ["alice", "bob"];

const NAMES: [&str; 8] = [
    "Milk", "Eggs", "Flour", "Rice", "Apples", "Chicken", "Butter", "Cheddar",
];

const SORT_FIELDS: [SortField; 6] = [
    SortField::Name,
    SortField::Category,
    SortField::Quantity,
    SortField::ReorderPoint,
    SortField::LastUpdated,
    SortField::ExpirationDate,
];

/// One thing a user can do in the inventory screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UserAction {
    SignIn { owner: OwnerId },
    SignOut,
    ShowArchived { archived: bool },
    FilterCategory { category: Option<CategoryId> },
    ToggleSort { field: SortField },
    ToggleSelect { id: ItemId },
    SelectAll,
    ClearSelection,
    Add { draft: ItemDraft },
    Edit { id: ItemId, patch: ItemPatch },
    Archive,
    Unarchive,
    RequestDelete,
    ConfirmDelete,
    Export,
    DismissNotice,
    Retry,
}

/// How the view-model answered an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ActionResult {
    Done,
    Submitted { request: u64 },
    Exported,
    Busy,
    Rejected { code: String, message: String },
}

impl ActionResult {
    fn from_dispatch(dispatch: Dispatch) -> Self {
        match dispatch {
            Dispatch::Submitted(id) => Self::Submitted { request: id.0 },
            Dispatch::Completed => Self::Exported,
            Dispatch::AlreadyInFlight => Self::Busy,
        }
    }
}

/// Picks and performs user actions. Holds the delete confirmation between
/// the two steps of a delete, like an open dialog would.
#[derive(Debug, Default)]
pub struct UserActor {
    categories: Vec<CategoryId>,
    confirmation: Option<DeleteConfirmation>,
    exporter: CollectingExporter,
    now: Option<DateTime<Utc>>,
}

impl UserActor {
    #[must_use]
    pub fn new(categories: Vec<CategoryId>) -> Self {
        Self {
            categories,
            ..Self::default()
        }
    }

    /// Wall time used for expiration dates in generated drafts.
    pub const fn set_now(&mut self, now: DateTime<Utc>) {
        self.now = Some(now);
    }

    #[must_use]
    pub const fn exporter(&self) -> &CollectingExporter {
        &self.exporter
    }

    #[must_use]
    pub const fn has_open_confirmation(&self) -> bool {
        self.confirmation.is_some()
    }

    /// Choose the next action given what is on screen.
    pub fn choose<F: LiveFeed, B: Backend>(
        &self,
        vm: &InventoryViewModel<F, B>,
        rng: &mut DeterministicRng,
    ) -> UserAction {
        let visible: Vec<ItemId> = vm.visible().iter().map(|item| item.id.clone()).collect();
        if vm.identity().is_none() {
            return if rng.hit_rate_percent(80) {
                Self::sign_in(rng)
            } else {
                UserAction::ToggleSort {
                    field: Self::sort_field(rng),
                }
            };
        }
        if self.confirmation.is_some() && rng.hit_rate_percent(60) {
            return UserAction::ConfirmDelete;
        }

        match rng.next_bounded(100) {
            0..=3 => Self::sign_in(rng),
            4..=5 => UserAction::SignOut,
            6..=12 => UserAction::ShowArchived {
                archived: !vm.archived_flag(),
            },
            13..=17 => UserAction::FilterCategory {
                category: if rng.hit_rate_percent(40) {
                    None
                } else {
                    rng.pick(&self.categories).cloned()
                },
            },
            18..=21 => UserAction::ToggleSort {
                field: Self::sort_field(rng),
            },
            22..=37 => rng.pick(&visible).map_or(UserAction::SelectAll, |id| {
                UserAction::ToggleSelect { id: id.clone() }
            }),
            38..=42 => UserAction::SelectAll,
            43..=44 => UserAction::ClearSelection,
            45..=57 => UserAction::Add {
                draft: self.draft(rng),
            },
            58..=66 => match rng.pick(&visible) {
                Some(id) => UserAction::Edit {
                    id: id.clone(),
                    patch: Self::patch(rng),
                },
                None => UserAction::Add {
                    draft: self.draft(rng),
                },
            },
            67..=74 => UserAction::Archive,
            75..=81 => UserAction::Unarchive,
            82..=87 => UserAction::RequestDelete,
            88..=92 => UserAction::Export,
            93..=96 => UserAction::DismissNotice,
            _ => UserAction::Retry,
        }
    }

    /// Perform `action` against the view-model.
    pub fn perform<F: LiveFeed, B: Backend>(
        &mut self,
        vm: &mut InventoryViewModel<F, B>,
        action: &UserAction,
    ) -> ActionResult {
        let outcome = match action {
            UserAction::SignIn { owner } => {
                vm.set_identity(Some(owner.clone()));
                Ok(ActionResult::Done)
            }
            UserAction::SignOut => {
                vm.set_identity(None);
                Ok(ActionResult::Done)
            }
            UserAction::ShowArchived { archived } => {
                vm.set_archived_flag(*archived);
                Ok(ActionResult::Done)
            }
            UserAction::FilterCategory { category } => {
                vm.set_category_filter(
                    category
                        .clone()
                        .map_or(CategoryFilter::All, CategoryFilter::Only),
                );
                Ok(ActionResult::Done)
            }
            UserAction::ToggleSort { field } => {
                vm.toggle_sort(*field);
                Ok(ActionResult::Done)
            }
            UserAction::ToggleSelect { id } => {
                vm.toggle_selection(id);
                Ok(ActionResult::Done)
            }
            UserAction::SelectAll => {
                vm.select_all();
                Ok(ActionResult::Done)
            }
            UserAction::ClearSelection => {
                vm.clear_selection();
                Ok(ActionResult::Done)
            }
            UserAction::Add { draft } => vm.add_item(draft.clone()).map(ActionResult::from_dispatch),
            UserAction::Edit { id, patch } => vm
                .edit_item(id, patch.clone())
                .map(ActionResult::from_dispatch),
            UserAction::Archive => vm.archive_selected().map(ActionResult::from_dispatch),
            UserAction::Unarchive => vm.unarchive_selected().map(ActionResult::from_dispatch),
            UserAction::RequestDelete => vm.request_delete().map(|confirmation| {
                self.confirmation = Some(confirmation);
                ActionResult::Done
            }),
            UserAction::ConfirmDelete => match self.confirmation.take() {
                Some(confirmation) => vm
                    .confirm_delete(confirmation)
                    .map(ActionResult::from_dispatch),
                None => Ok(ActionResult::Done),
            },
            UserAction::Export => vm
                .export_to(&mut self.exporter, ExportFormat::Xlsx)
                .map(ActionResult::from_dispatch),
            UserAction::DismissNotice => {
                vm.dismiss_notice();
                Ok(ActionResult::Done)
            }
            UserAction::Retry => {
                vm.resubscribe();
                Ok(ActionResult::Done)
            }
        };
        outcome.unwrap_or_else(|err| ActionResult::Rejected {
            code: err.code().to_string(),
            message: err.to_string(),
        })
    }

    fn sign_in(rng: &mut DeterministicRng) -> UserAction {
        let owner = rng.pick(&OWNERS).copied().unwrap_or("alice");
        UserAction::SignIn {
            owner: OwnerId::new(owner),
        }
    }

    fn sort_field(rng: &mut DeterministicRng) -> SortField {
        rng.pick(&SORT_FIELDS).copied().unwrap_or_default()
    }

    fn draft(&self, rng: &mut DeterministicRng) -> ItemDraft {
        let name = if rng.hit_rate_percent(5) {
            "   ".to_string()
        } else {
            rng.pick(&NAMES).copied().unwrap_or("Milk").to_string()
        };
        let expiration_date = match self.now {
            Some(now) if rng.hit_rate_percent(50) => {
                let hours = i64::try_from(rng.next_bounded(24 * 20)).unwrap_or(0) - 24 * 2;
                Some(now + Duration::hours(hours))
            }
            _ => None,
        };
        ItemDraft {
            name,
            category_id: rng.pick(&self.categories).cloned(),
            quantity: rng.next_amount(0, 20),
            unit: "pcs".to_string(),
            reorder_point: rng.next_amount(0, 8),
            expiration_date,
        }
    }

    fn patch(rng: &mut DeterministicRng) -> ItemPatch {
        ItemPatch {
            quantity: Some(rng.next_amount(0, 20)),
            ..ItemPatch::default()
        }
    }
}
