use std::collections::BTreeMap;

use serde::Serialize;
use stocksense_core::backend::Backend;
use stocksense_core::feed::{LiveFeed, SubscriptionKey};
use stocksense_core::memory::InMemoryStore;
use stocksense_core::model::{InventoryItem, ItemId, OwnerId};
use stocksense_core::normalize::normalize_snapshot;
use stocksense_core::InventoryViewModel;

// ── Core result types ─────────────────────────────────────────────────────────

/// Outcome of one or more invariant checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    #[must_use]
    pub const fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    #[must_use]
    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    /// Merge another result into this one (failures accumulate).
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

// ── Invariant violation diagnostics ──────────────────────────────────────────

/// Diagnostic information for a single failed invariant check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "invariant", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// The list shows an item owned by someone other than the signed-in user.
    ForeignItem {
        round: u64,
        item: ItemId,
        owner: OwnerId,
        identity: Option<OwnerId>,
    },

    /// An item from the other archive partition is on screen.
    PartitionLeak {
        round: u64,
        item: ItemId,
        item_archived: bool,
        showing_archived: bool,
    },

    /// A selected id is not among the visible rows.
    SelectionNotVisible { round: u64, item: ItemId },

    /// More than one mutation was outstanding, or the busy flag disagrees
    /// with what the backend is actually holding.
    InFlightMismatch {
        round: u64,
        outstanding: usize,
        busy: bool,
    },

    /// After every delivery drained, the list differs from the store.
    Divergence {
        key: String,
        missing: Vec<ItemId>,
        extra: Vec<ItemId>,
        changed: Vec<ItemId>,
    },

    /// Still loading or busy with nothing left to deliver.
    Stuck { loading: bool, busy: bool },
}

/// Checks run after every round of a simulation.
pub struct StepOracle;

impl StepOracle {
    /// Every per-round invariant.
    ///
    /// `outstanding` is the number of requests the backend accepted whose
    /// outcome the view-model has not been handed yet.
    #[must_use]
    pub fn check_all<F: LiveFeed, B: Backend>(
        round: u64,
        vm: &InventoryViewModel<F, B>,
        outstanding: usize,
    ) -> OracleResult {
        Self::check_ownership(round, vm)
            .merge(Self::check_partition(round, vm))
            .merge(Self::check_selection(round, vm))
            .merge(Self::check_single_flight(round, vm, outstanding))
    }

    /// Signed out means an empty list; signed in means only own items.
    #[must_use]
    pub fn check_ownership<F: LiveFeed, B: Backend>(
        round: u64,
        vm: &InventoryViewModel<F, B>,
    ) -> OracleResult {
        let identity = vm.identity();
        let violations = vm
            .items()
            .iter()
            .filter(|item| identity != Some(&item.owner_id))
            .map(|item| InvariantViolation::ForeignItem {
                round,
                item: item.id.clone(),
                owner: item.owner_id.clone(),
                identity: identity.cloned(),
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_partition<F: LiveFeed, B: Backend>(
        round: u64,
        vm: &InventoryViewModel<F, B>,
    ) -> OracleResult {
        let showing_archived = vm.archived_flag();
        let violations = vm
            .items()
            .iter()
            .filter(|item| item.archived != showing_archived)
            .map(|item| InvariantViolation::PartitionLeak {
                round,
                item: item.id.clone(),
                item_archived: item.archived,
                showing_archived,
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_selection<F: LiveFeed, B: Backend>(
        round: u64,
        vm: &InventoryViewModel<F, B>,
    ) -> OracleResult {
        let visible: Vec<&ItemId> = vm.visible().into_iter().map(|item| &item.id).collect();
        let violations = vm
            .selection()
            .iter()
            .filter(|id| !visible.contains(id))
            .map(|id| InvariantViolation::SelectionNotVisible {
                round,
                item: id.clone(),
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    /// Busy exactly while one request is outstanding, never more than one.
    #[must_use]
    pub fn check_single_flight<F: LiveFeed, B: Backend>(
        round: u64,
        vm: &InventoryViewModel<F, B>,
        outstanding: usize,
    ) -> OracleResult {
        let busy = vm.is_busy();
        if outstanding == usize::from(busy) {
            return OracleResult::pass();
        }
        OracleResult::from_violations(vec![InvariantViolation::InFlightMismatch {
            round,
            outstanding,
            busy,
        }])
    }
}

/// Checks run once the simulation has drained every delivery.
pub struct QuiescenceOracle;

impl QuiescenceOracle {
    #[must_use]
    pub fn check_all<F: LiveFeed, B: Backend>(
        vm: &InventoryViewModel<F, B>,
        store: &InMemoryStore,
    ) -> OracleResult {
        Self::check_settled(vm).merge(Self::check_convergence(vm, store))
    }

    #[must_use]
    pub fn check_settled<F: LiveFeed, B: Backend>(vm: &InventoryViewModel<F, B>) -> OracleResult {
        let loading = vm.is_loading();
        let busy = vm.is_busy();
        if loading || busy {
            return OracleResult::from_violations(vec![InvariantViolation::Stuck { loading, busy }]);
        }
        OracleResult::pass()
    }

    /// The list equals a fresh normalized query of the store for the same key.
    #[must_use]
    pub fn check_convergence<F: LiveFeed, B: Backend>(
        vm: &InventoryViewModel<F, B>,
        store: &InMemoryStore,
    ) -> OracleResult {
        let Some(owner) = vm.identity() else {
            if vm.items().is_empty() {
                return OracleResult::pass();
            }
            return OracleResult::from_violations(vec![InvariantViolation::Divergence {
                key: "signed-out".to_string(),
                missing: Vec::new(),
                extra: vm.items().iter().map(|item| item.id.clone()).collect(),
                changed: Vec::new(),
            }]);
        };
        let key = SubscriptionKey::new(owner.clone(), vm.archived_flag());
        let expected = normalize_snapshot(&store.query(&key), &key);
        diff_items(&key, vm.items(), &expected)
    }
}

fn diff_items(
    key: &SubscriptionKey,
    actual: &[InventoryItem],
    expected: &[InventoryItem],
) -> OracleResult {
    let actual: BTreeMap<&ItemId, &InventoryItem> = actual.iter().map(|i| (&i.id, i)).collect();
    let expected: BTreeMap<&ItemId, &InventoryItem> = expected.iter().map(|i| (&i.id, i)).collect();

    let missing: Vec<ItemId> = expected
        .keys()
        .filter(|id| !actual.contains_key(*id))
        .map(|id| (*id).clone())
        .collect();
    let extra: Vec<ItemId> = actual
        .keys()
        .filter(|id| !expected.contains_key(*id))
        .map(|id| (*id).clone())
        .collect();
    let changed: Vec<ItemId> = actual
        .iter()
        .filter(|(id, item)| expected.get(*id).is_some_and(|e| e != *item))
        .map(|(id, _)| (*id).clone())
        .collect();

    if missing.is_empty() && extra.is_empty() && changed.is_empty() {
        return OracleResult::pass();
    }
    OracleResult::from_violations(vec![InvariantViolation::Divergence {
        key: key.to_string(),
        missing,
        extra,
        changed,
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use stocksense_core::memory::{SharedStore, pump};
    use stocksense_core::model::{CategoryId, ItemDraft};

    fn draft(name: &str) -> ItemDraft {
        ItemDraft {
            name: name.to_string(),
            category_id: Some(CategoryId::new("dairy")),
            quantity: 4.0,
            unit: "l".to_string(),
            reorder_point: 1.0,
            expiration_date: None,
        }
    }

    fn setup() -> (SharedStore, InventoryViewModel<SharedStore, SharedStore>) {
        let start = Utc
            .timestamp_opt(1_700_000_000, 0)
            .single()
            .expect("valid timestamp");
        let mut inner = InMemoryStore::new(start);
        let alice = OwnerId::new("alice");
        inner.seed(&alice, &draft("Milk"), false);
        inner.seed(&alice, &draft("Cream"), true);
        inner.seed(&OwnerId::new("bob"), &draft("Kefir"), false);
        let store = SharedStore::new(inner);
        let vm = InventoryViewModel::new(store.clone(), store.clone());
        (store, vm)
    }

    #[test]
    fn settled_view_passes_everything() {
        let (store, mut vm) = setup();
        vm.set_identity(Some(OwnerId::new("alice")));
        pump(&store, &mut vm);
        vm.select_all();
        assert!(StepOracle::check_all(1, &vm, 0).passed);
        let result = store.with(|s| QuiescenceOracle::check_all(&vm, s));
        assert!(result.passed, "{:?}", result.violations);
    }

    #[test]
    fn unapplied_write_is_divergence() {
        let (store, mut vm) = setup();
        vm.set_identity(Some(OwnerId::new("alice")));
        pump(&store, &mut vm);
        let added = store.with(|s| s.seed(&OwnerId::new("alice"), &draft("Yogurt"), false));
        let result = store.with(|s| QuiescenceOracle::check_convergence(&vm, s));
        assert!(!result.passed);
        match &result.violations[0] {
            InvariantViolation::Divergence { missing, extra, .. } => {
                assert_eq!(missing, &vec![added]);
                assert!(extra.is_empty());
            }
            other => panic!("unexpected violation {other:?}"),
        }
    }

    #[test]
    fn busy_without_outstanding_request_is_flagged() {
        let (store, mut vm) = setup();
        vm.set_identity(Some(OwnerId::new("alice")));
        pump(&store, &mut vm);
        vm.set_categories(vec![stocksense_core::model::Category::new(
            "dairy", "Dairy", "#3B82F6",
        )]);
        vm.add_item(draft("Yogurt")).expect("dispatch");
        assert!(StepOracle::check_single_flight(3, &vm, 1).passed);
        let result = StepOracle::check_single_flight(3, &vm, 0);
        assert_eq!(
            result.violations,
            vec![InvariantViolation::InFlightMismatch {
                round: 3,
                outstanding: 0,
                busy: true
            }]
        );
    }

    #[test]
    fn loading_before_first_snapshot_is_stuck() {
        let (_store, mut vm) = setup();
        vm.set_identity(Some(OwnerId::new("alice")));
        let result = QuiescenceOracle::check_settled(&vm);
        assert_eq!(
            result.violations,
            vec![InvariantViolation::Stuck {
                loading: true,
                busy: false
            }]
        );
    }
}
