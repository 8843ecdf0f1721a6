//! The inventory view-model.
//!
//! Holds the canonical item list for the signed-in identity and one
//! partition, kept equal to the last snapshot pushed by the live feed.
//! Mutations go to the backend and become visible only through a later
//! snapshot; the canonical list is never edited locally.
//!
//! Everything is driven by the host on a single thread:
//!
//! ```text
//! host ── set_identity / set_archived_flag ──▶ SubscriptionSlot ──▶ LiveFeed
//! host ── handle_feed_event ────────────────▶ normalize ──▶ canonical list
//! host ── archive_selected / confirm_delete ─▶ BulkOrchestrator ──▶ Backend
//! host ── handle_mutation_outcome ──────────▶ BulkOrchestrator (notice, selection)
//! host ── tick(now) ────────────────────────▶ notice expiry
//! ```

use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendError, MutationRequest, RequestId};
use crate::bulk::{BulkOperation, BulkOrchestrator, Notice, Phase, Resolution};
use crate::categories::CategoryDirectory;
use crate::config::StockSenseConfig;
use crate::error::ViewModelError;
use crate::export::{ExportFormat, ExportRow, Exporter, build_export_rows};
use crate::feed::{FeedError, FeedEvent, FeedPayload, LiveFeed, SubscriptionKey};
use crate::model::{Category, InventoryItem, ItemDraft, ItemId, ItemPatch, OwnerId};
use crate::normalize::normalize_snapshot;
use crate::selection::Selection;
use crate::session::Session;
use crate::subscription::{ActiveSubscription, SubscriptionSlot};
use crate::summary::{InventorySummary, StockAlert, stock_alerts};
use crate::view::{CategoryFilter, SortDirection, SortField, ViewState, derive_view};

/// What a mutation trigger did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A backend request was issued; its outcome arrives later.
    Submitted(RequestId),
    /// The operation finished locally (export).
    Completed,
    /// Another operation is in flight; nothing was issued.
    AlreadyInFlight,
}

/// Proof that the user was asked to confirm a delete.
///
/// Only [`InventoryViewModel::request_delete`] creates one, and
/// [`InventoryViewModel::confirm_delete`] is the only way to issue a delete.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a delete is only issued by passing the confirmation to confirm_delete"]
pub struct DeleteConfirmation {
    owner: OwnerId,
    ids: Vec<ItemId>,
}

impl DeleteConfirmation {
    /// Items the user agreed to delete.
    #[must_use]
    pub fn ids(&self) -> &[ItemId] {
        &self.ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

pub struct InventoryViewModel<F: LiveFeed, B: Backend> {
    feed: F,
    backend: B,
    config: StockSenseConfig,
    identity: Option<OwnerId>,
    archived: bool,
    slot: SubscriptionSlot,
    items: Vec<InventoryItem>,
    categories: Vec<Category>,
    loading: bool,
    feed_error: Option<FeedError>,
    view: ViewState,
    selection: Selection,
    bulk: BulkOrchestrator,
    /// Latest time seen through `tick`; notices are stamped with it.
    now: Instant,
}

impl<F: LiveFeed, B: Backend> InventoryViewModel<F, B> {
    #[must_use]
    pub fn new(feed: F, backend: B) -> Self {
        Self::with_config(feed, backend, StockSenseConfig::default())
    }

    #[must_use]
    pub fn with_config(feed: F, backend: B, config: StockSenseConfig) -> Self {
        let view = ViewState {
            sort_field: config.view.sort_field,
            direction: config.view.direction,
            category_filter: CategoryFilter::All,
        };
        let bulk = BulkOrchestrator::new(config.notices.display_duration());
        Self {
            feed,
            backend,
            config,
            identity: None,
            archived: false,
            slot: SubscriptionSlot::new(),
            items: Vec::new(),
            categories: Vec::new(),
            loading: false,
            feed_error: None,
            view,
            selection: Selection::new(),
            bulk,
            now: Instant::now(),
        }
    }

    // --- session & subscription ------------------------------------------

    /// Switch to `identity`, or sign out with `None`.
    ///
    /// Any change clears the canonical list and the selection before a new
    /// subscription is opened, so nothing from the previous identity stays
    /// visible.
    pub fn set_identity(&mut self, identity: Option<OwnerId>) {
        if self.identity == identity {
            return;
        }
        info!(
            from = ?self.identity.as_ref().map(OwnerId::as_str),
            to = ?identity.as_ref().map(OwnerId::as_str),
            "identity changed"
        );
        self.identity = identity;
        self.items.clear();
        self.selection.clear();
        self.feed_error = None;
        if self.identity.is_some() {
            self.open_subscription();
        } else {
            self.slot.teardown(&mut self.feed);
            self.loading = false;
        }
    }

    pub fn sync_session(&mut self, session: &impl Session) {
        self.set_identity(session.current_identity());
    }

    /// Switch between the active and archived partitions.
    pub fn set_archived_flag(&mut self, archived: bool) {
        if self.archived == archived {
            return;
        }
        debug!(archived, "partition changed");
        self.bulk.acknowledge();
        self.archived = archived;
        self.selection.clear();
        self.items.clear();
        self.feed_error = None;
        if self.identity.is_some() {
            self.open_subscription();
        }
    }

    /// Tear down and reopen the current subscription with the same key.
    /// The canonical list is kept until the new subscription delivers.
    pub fn resubscribe(&mut self) {
        if self.identity.is_some() {
            self.open_subscription();
        }
    }

    fn open_subscription(&mut self) {
        let Some(owner) = self.identity.clone() else {
            return;
        };
        let key = SubscriptionKey::new(owner, self.archived);
        match self.slot.replace(&mut self.feed, key) {
            Ok(_) => {
                self.loading = true;
            }
            Err(err) => {
                warn!(code = %err.code(), "failed to open subscription: {err}");
                self.loading = false;
                self.feed_error = Some(err);
            }
        }
    }

    /// Apply an event from the feed. Returns whether it was applied; events
    /// for any subscription other than the live one are discarded.
    pub fn handle_feed_event(&mut self, event: FeedEvent) -> bool {
        if !self.slot.is_current(event.subscription) {
            debug!(subscription = %event.subscription, "discarding event for stale subscription");
            return false;
        }
        let Some(key) = self.slot.key().cloned() else {
            return false;
        };
        match event.payload {
            FeedPayload::Snapshot(records) => {
                self.items = normalize_snapshot(&records, &key);
                self.loading = false;
                self.feed_error = None;
                if self.slot.mark_primed() {
                    debug!(subscription = %event.subscription, "first snapshot applied");
                }
                let dropped = self.prune_selection();
                debug!(
                    subscription = %event.subscription,
                    items = self.items.len(),
                    dropped_from_selection = dropped,
                    "snapshot applied"
                );
            }
            FeedPayload::Error(err) => {
                warn!(subscription = %event.subscription, code = %err.code(), "feed error: {err}");
                self.loading = false;
                self.feed_error = Some(err);
            }
        }
        true
    }

    // --- categories -------------------------------------------------------

    pub fn refresh_categories(&mut self, directory: &impl CategoryDirectory) {
        self.set_categories(directory.active_categories());
    }

    pub fn set_categories(&mut self, categories: Vec<Category>) {
        self.categories = categories;
    }

    // --- derived view -----------------------------------------------------

    /// The filtered, sorted rows to render.
    #[must_use]
    pub fn visible(&self) -> Vec<&InventoryItem> {
        derive_view(&self.items, &self.view, &self.categories)
    }

    fn visible_ids(&self) -> Vec<ItemId> {
        self.visible().into_iter().map(|item| item.id.clone()).collect()
    }

    fn prune_selection(&mut self) -> usize {
        let visible = self.visible_ids();
        self.selection.retain_visible(&visible)
    }

    pub fn set_sort_field(&mut self, field: SortField) {
        self.bulk.acknowledge();
        self.view.sort_field = field;
    }

    pub fn set_sort_direction(&mut self, direction: SortDirection) {
        self.bulk.acknowledge();
        self.view.direction = direction;
    }

    /// Column-header behavior: the same field flips direction, a new field
    /// starts ascending.
    pub fn toggle_sort(&mut self, field: SortField) {
        self.bulk.acknowledge();
        if self.view.sort_field == field {
            self.view.direction = self.view.direction.toggled();
        } else {
            self.view.sort_field = field;
            self.view.direction = SortDirection::Asc;
        }
    }

    pub fn set_category_filter(&mut self, filter: CategoryFilter) {
        self.bulk.acknowledge();
        self.view.category_filter = filter;
        let dropped = self.prune_selection();
        if dropped > 0 {
            debug!(dropped, "filter change dropped selected items");
        }
    }

    pub fn toggle_selection(&mut self, id: &ItemId) -> bool {
        self.bulk.acknowledge();
        let visible = self.visible_ids();
        self.selection.toggle(id, &visible)
    }

    pub fn select_all(&mut self) {
        self.bulk.acknowledge();
        let visible = self.visible_ids();
        self.selection.select_all(&visible);
    }

    pub fn clear_selection(&mut self) {
        self.bulk.acknowledge();
        self.selection.clear();
    }

    #[must_use]
    pub fn all_selected(&self) -> bool {
        self.selection.all_selected(&self.visible_ids())
    }

    // --- mutations --------------------------------------------------------

    fn require_identity(&self) -> Result<OwnerId, ViewModelError> {
        self.identity.clone().ok_or(ViewModelError::AuthRequired)
    }

    fn selected_ids(&self) -> Vec<ItemId> {
        self.selection.iter().cloned().collect()
    }

    fn dispatch(
        &mut self,
        request: MutationRequest,
        operation: BulkOperation,
    ) -> Result<Dispatch, ViewModelError> {
        let count = request.len();
        let owner = request.owner().clone();
        match self.backend.submit(request) {
            Ok(id) => {
                info!(request = %id, %owner, %operation, count, "mutation dispatched");
                self.bulk.begin(id, owner, operation, count);
                Ok(Dispatch::Submitted(id))
            }
            Err(err) => {
                let err = backend_error(&err);
                self.bulk.fail_now(operation, count, err.clone(), self.now);
                Err(err)
            }
        }
    }

    /// # Errors
    ///
    /// [`ViewModelError::AuthRequired`] when signed out,
    /// [`ViewModelError::Validation`] for an invalid draft, and
    /// [`ViewModelError::BackendUnavailable`] if the request cannot be queued.
    pub fn add_item(&mut self, draft: ItemDraft) -> Result<Dispatch, ViewModelError> {
        self.bulk.acknowledge();
        let owner = self.require_identity()?;
        draft.validate(&self.categories)?;
        if self.bulk.is_busy() {
            return Ok(Dispatch::AlreadyInFlight);
        }
        let request = MutationRequest::AddItem {
            owner,
            draft: draft.normalized(),
        };
        self.dispatch(request, BulkOperation::Add)
    }

    /// # Errors
    ///
    /// As [`Self::add_item`], plus [`ViewModelError::StaleReference`] when
    /// `id` is not in the canonical list.
    pub fn edit_item(&mut self, id: &ItemId, patch: ItemPatch) -> Result<Dispatch, ViewModelError> {
        self.bulk.acknowledge();
        let owner = self.require_identity()?;
        patch.validate(&self.categories)?;
        if !self.items.iter().any(|item| &item.id == id) {
            return Err(ViewModelError::StaleReference(id.clone()));
        }
        if self.bulk.is_busy() {
            return Ok(Dispatch::AlreadyInFlight);
        }
        let request = MutationRequest::UpdateItem {
            owner,
            id: id.clone(),
            patch: patch.normalized(),
        };
        self.dispatch(request, BulkOperation::Edit)
    }

    /// Archive every selected item in one atomic batch.
    ///
    /// # Errors
    ///
    /// [`ViewModelError::AuthRequired`], [`ViewModelError::EmptySelection`],
    /// [`ViewModelError::Validation`] when viewing the archived partition,
    /// or [`ViewModelError::BackendUnavailable`].
    pub fn archive_selected(&mut self) -> Result<Dispatch, ViewModelError> {
        self.set_selected_archived(true)
    }

    /// Restore every selected item in one atomic batch.
    ///
    /// # Errors
    ///
    /// As [`Self::archive_selected`], with the partition check reversed.
    pub fn unarchive_selected(&mut self) -> Result<Dispatch, ViewModelError> {
        self.set_selected_archived(false)
    }

    fn set_selected_archived(&mut self, archived: bool) -> Result<Dispatch, ViewModelError> {
        self.bulk.acknowledge();
        let owner = self.require_identity()?;
        if self.selection.is_empty() {
            return Err(ViewModelError::EmptySelection);
        }
        if self.archived == archived {
            let msg = if archived {
                "selected items are already archived"
            } else {
                "selected items are not archived"
            };
            return Err(ViewModelError::Validation(msg.to_string()));
        }
        if self.bulk.is_busy() {
            return Ok(Dispatch::AlreadyInFlight);
        }
        let request = MutationRequest::SetArchived {
            owner,
            ids: self.selected_ids(),
            archived,
        };
        let operation = if archived {
            BulkOperation::Archive
        } else {
            BulkOperation::Unarchive
        };
        self.dispatch(request, operation)
    }

    /// First step of a delete: capture the selection for the user to confirm.
    ///
    /// # Errors
    ///
    /// [`ViewModelError::AuthRequired`] or [`ViewModelError::EmptySelection`].
    pub fn request_delete(&mut self) -> Result<DeleteConfirmation, ViewModelError> {
        self.bulk.acknowledge();
        let owner = self.require_identity()?;
        if self.selection.is_empty() {
            return Err(ViewModelError::EmptySelection);
        }
        Ok(DeleteConfirmation {
            owner,
            ids: self.selected_ids(),
        })
    }

    /// Issue the hard delete the user confirmed. Ids that disappeared from the
    /// canonical list since confirmation are left out of the batch.
    ///
    /// # Errors
    ///
    /// [`ViewModelError::AuthRequired`] if the identity changed since the
    /// confirmation was requested, [`ViewModelError::StaleReference`] if none
    /// of the confirmed items exist any more, or
    /// [`ViewModelError::BackendUnavailable`].
    pub fn confirm_delete(
        &mut self,
        confirmation: DeleteConfirmation,
    ) -> Result<Dispatch, ViewModelError> {
        self.bulk.acknowledge();
        let owner = self.require_identity()?;
        if owner != confirmation.owner {
            return Err(ViewModelError::AuthRequired);
        }
        let ids: Vec<ItemId> = confirmation
            .ids
            .iter()
            .filter(|id| self.items.iter().any(|item| &item.id == *id))
            .cloned()
            .collect();
        if ids.is_empty() {
            let first = confirmation
                .ids
                .into_iter()
                .next()
                .unwrap_or_else(|| ItemId::new(""));
            return Err(ViewModelError::StaleReference(first));
        }
        if self.bulk.is_busy() {
            return Ok(Dispatch::AlreadyInFlight);
        }
        self.dispatch(MutationRequest::DeleteItems { owner, ids }, BulkOperation::Delete)
    }

    /// Rows for the selected items, in canonical order.
    ///
    /// # Errors
    ///
    /// [`ViewModelError::EmptySelection`] or [`ViewModelError::NothingToExport`].
    pub fn export_rows(&self) -> Result<Vec<ExportRow>, ViewModelError> {
        build_export_rows(&self.selection, &self.items, &self.categories)
    }

    /// Export the selection through `exporter`. On success the selection is
    /// cleared and a success notice is shown, stamped with the last `tick`.
    ///
    /// # Errors
    ///
    /// As [`Self::export_rows`], plus [`ViewModelError::Export`] when the
    /// exporter fails; the selection is kept in that case.
    pub fn export_to<E: Exporter>(
        &mut self,
        exporter: &mut E,
        format: ExportFormat,
    ) -> Result<Dispatch, ViewModelError> {
        self.bulk.acknowledge();
        let rows = self.export_rows()?;
        if self.bulk.is_busy() {
            return Ok(Dispatch::AlreadyInFlight);
        }
        match exporter.write(&rows, format) {
            Ok(()) => {
                self.bulk
                    .succeed_now(BulkOperation::Export, rows.len(), self.now);
                self.selection.clear();
                Ok(Dispatch::Completed)
            }
            Err(err) => {
                let err = ViewModelError::Export(err.to_string());
                self.bulk
                    .fail_now(BulkOperation::Export, rows.len(), err.clone(), self.now);
                Err(err)
            }
        }
    }

    /// Deliver the outcome of a submitted request at `now`. Outcomes for
    /// requests that are not in flight are ignored.
    ///
    /// `now` also advances the notice clock, so the success notice is shown
    /// for its full duration however long the request took. An outcome that
    /// arrives after the issuing identity was replaced clears the busy flag
    /// and nothing else.
    pub fn handle_mutation_outcome(
        &mut self,
        request: RequestId,
        outcome: Result<(), BackendError>,
        now: Instant,
    ) -> Option<Resolution> {
        self.advance_clock(now);
        let outcome = outcome.map_err(|err| backend_error(&err));
        let resolution = self
            .bulk
            .resolve(request, outcome, self.identity.as_ref(), self.now)?;
        if let Resolution::Succeeded(operation) = resolution {
            if operation.consumes_selection() {
                self.selection.clear();
            }
        }
        Some(resolution)
    }

    // --- notices ----------------------------------------------------------

    /// Advance the notice clock. Success notices expire once their display
    /// duration has passed.
    pub fn tick(&mut self, now: Instant) {
        self.advance_clock(now);
        self.bulk.tick(self.now);
    }

    fn advance_clock(&mut self, now: Instant) {
        if now > self.now {
            self.now = now;
        }
    }

    /// Dismiss the current notice and any feed error.
    pub fn dismiss_notice(&mut self) {
        self.bulk.dismiss();
        self.feed_error = None;
    }

    // --- accessors --------------------------------------------------------

    #[must_use]
    pub fn items(&self) -> &[InventoryItem] {
        &self.items
    }

    #[must_use]
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    #[must_use]
    pub const fn selection(&self) -> &Selection {
        &self.selection
    }

    #[must_use]
    pub const fn view_state(&self) -> &ViewState {
        &self.view
    }

    #[must_use]
    pub const fn identity(&self) -> Option<&OwnerId> {
        self.identity.as_ref()
    }

    #[must_use]
    pub const fn archived_flag(&self) -> bool {
        self.archived
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub const fn feed_error(&self) -> Option<&FeedError> {
        self.feed_error.as_ref()
    }

    #[must_use]
    pub const fn subscription(&self) -> Option<&ActiveSubscription> {
        self.slot.active()
    }

    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.bulk.is_busy()
    }

    #[must_use]
    pub const fn phase(&self) -> &Phase {
        self.bulk.phase()
    }

    #[must_use]
    pub const fn notice(&self) -> Option<&Notice> {
        self.bulk.notice()
    }

    #[must_use]
    pub const fn config(&self) -> &StockSenseConfig {
        &self.config
    }

    #[must_use]
    pub fn summary(&self, now: DateTime<Utc>) -> InventorySummary {
        InventorySummary::compute(
            &self.items,
            &self.categories,
            now,
            self.config.alerts.expiring_within_days,
        )
    }

    #[must_use]
    pub fn alerts(&self, now: DateTime<Utc>) -> Vec<StockAlert> {
        stock_alerts(&self.items, now, self.config.alerts.expiring_within_days)
    }

    #[must_use]
    pub const fn feed(&self) -> &F {
        &self.feed
    }

    pub const fn feed_mut(&mut self) -> &mut F {
        &mut self.feed
    }

    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    pub const fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<F: LiveFeed, B: Backend> Drop for InventoryViewModel<F, B> {
    fn drop(&mut self) {
        self.slot.teardown(&mut self.feed);
    }
}

fn backend_error(err: &BackendError) -> ViewModelError {
    ViewModelError::BackendUnavailable(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::SubscriptionId;
    use serde_json::{Value, json};
    use std::time::Duration;

    #[derive(Default)]
    struct ScriptedFeed {
        next: u64,
        live: Vec<SubscriptionId>,
        log: Vec<String>,
    }

    impl LiveFeed for ScriptedFeed {
        fn subscribe(&mut self, key: &SubscriptionKey) -> Result<SubscriptionId, FeedError> {
            self.next += 1;
            let id = SubscriptionId(self.next);
            self.live.push(id);
            self.log.push(format!("sub {key}"));
            Ok(id)
        }

        fn unsubscribe(&mut self, id: SubscriptionId) {
            self.live.retain(|s| *s != id);
            self.log.push(format!("unsub {}", id.0));
        }
    }

    #[derive(Default)]
    struct ScriptedBackend {
        next: u64,
        submitted: Vec<MutationRequest>,
        offline: bool,
    }

    impl Backend for ScriptedBackend {
        fn submit(&mut self, request: MutationRequest) -> Result<RequestId, BackendError> {
            if self.offline {
                return Err(BackendError::Unavailable("offline".into()));
            }
            self.next += 1;
            self.submitted.push(request);
            Ok(RequestId(self.next))
        }
    }

    type Vm = InventoryViewModel<ScriptedFeed, ScriptedBackend>;

    fn record(id: &str, owner: &str, archived: bool, category: &str) -> Value {
        json!({
            "id": id,
            "name": format!("item {id}"),
            "categoryId": category,
            "quantity": 3,
            "unit": "pcs",
            "reorderPoint": 5,
            "lastUpdated": "2026-03-01T10:00:00Z",
            "ownerId": owner,
            "archived": archived,
        })
    }

    fn current_sub(vm: &Vm) -> SubscriptionId {
        vm.subscription().expect("live subscription").id
    }

    fn signed_in() -> Vm {
        let mut vm = Vm::new(ScriptedFeed::default(), ScriptedBackend::default());
        vm.set_categories(vec![
            Category::new("dairy", "Dairy", "#3B82F6"),
            Category::new("meat", "Meat", "#EF4444"),
        ]);
        vm.set_identity(Some(OwnerId::new("u1")));
        let sub = current_sub(&vm);
        vm.handle_feed_event(FeedEvent::snapshot(
            sub,
            vec![
                record("a", "u1", false, "dairy"),
                record("b", "u1", false, "meat"),
                record("c", "u1", false, "dairy"),
            ],
        ));
        vm
    }

    fn draft() -> ItemDraft {
        ItemDraft {
            name: "Cheese".into(),
            category_id: Some("dairy".into()),
            quantity: 2.0,
            unit: "kg".into(),
            reorder_point: 1.0,
            expiration_date: None,
        }
    }

    #[test]
    fn identity_opens_subscription_and_snapshot_clears_loading() {
        let mut vm = Vm::new(ScriptedFeed::default(), ScriptedBackend::default());
        assert!(!vm.is_loading());
        vm.set_identity(Some(OwnerId::new("u1")));
        assert!(vm.is_loading());
        let sub = current_sub(&vm);
        assert!(vm.handle_feed_event(FeedEvent::snapshot(sub, vec![record("a", "u1", false, "x")])));
        assert!(!vm.is_loading());
        assert_eq!(vm.items().len(), 1);
    }

    #[test]
    fn sign_out_empties_list_and_tears_down() {
        let mut vm = signed_in();
        vm.select_all();
        vm.set_identity(None);
        assert!(vm.items().is_empty());
        assert!(vm.selection().is_empty());
        assert!(!vm.is_loading());
        assert!(vm.subscription().is_none());
        assert!(vm.feed().live.is_empty());
    }

    #[test]
    fn stale_snapshot_after_partition_switch_is_discarded() {
        let mut vm = signed_in();
        let old = current_sub(&vm);
        vm.set_archived_flag(true);
        assert!(vm.is_loading());
        assert!(vm.items().is_empty());
        assert!(!vm.handle_feed_event(FeedEvent::snapshot(
            old,
            vec![record("a", "u1", false, "dairy")]
        )));
        assert!(vm.items().is_empty());
        assert_eq!(vm.feed().log, vec!["sub u1/active", "unsub 1", "sub u1/archived"]);
    }

    #[test]
    fn feed_error_keeps_last_known_list() {
        let mut vm = signed_in();
        let sub = current_sub(&vm);
        vm.handle_feed_event(FeedEvent::error(sub, FeedError::Unavailable("quota".into())));
        assert_eq!(vm.items().len(), 3);
        assert!(vm.feed_error().is_some());
        assert!(!vm.is_loading());
    }

    #[test]
    fn archive_twice_issues_one_request() {
        let mut vm = signed_in();
        vm.select_all();
        let first = vm.archive_selected().expect("dispatch");
        assert!(matches!(first, Dispatch::Submitted(_)));
        assert_eq!(vm.archive_selected(), Ok(Dispatch::AlreadyInFlight));
        assert_eq!(vm.backend().submitted.len(), 1);
    }

    #[test]
    fn archive_success_clears_selection_and_notice_expires() {
        let mut vm = signed_in();
        let t0 = Instant::now();
        vm.tick(t0);
        vm.select_all();
        let Ok(Dispatch::Submitted(req)) = vm.archive_selected() else {
            panic!("expected submission");
        };
        assert_eq!(
            vm.handle_mutation_outcome(req, Ok(()), t0),
            Some(Resolution::Succeeded(BulkOperation::Archive))
        );
        assert!(vm.selection().is_empty());
        assert!(!vm.is_busy());
        assert_eq!(
            vm.notice().map(|n| n.message.as_str()),
            Some("3 items archived successfully")
        );
        // canonical list only changes through the feed
        assert_eq!(vm.items().len(), 3);
        vm.tick(t0 + Duration::from_millis(3000));
        assert!(vm.notice().is_none());
    }

    #[test]
    fn archive_failure_preserves_selection() {
        let mut vm = signed_in();
        vm.select_all();
        let Ok(Dispatch::Submitted(req)) = vm.archive_selected() else {
            panic!("expected submission");
        };
        vm.handle_mutation_outcome(
            req,
            Err(BackendError::Aborted("conflict".into())),
            Instant::now(),
        );
        assert_eq!(vm.selection().len(), 3);
        assert!(matches!(vm.phase(), Phase::Failed { .. }));
        vm.toggle_selection(&ItemId::new("a"));
        assert_eq!(vm.selection().len(), 2);
        assert_eq!(vm.phase(), &Phase::Idle);
    }

    #[test]
    fn failure_notice_clears_on_view_changes() {
        let mut vm = signed_in();
        vm.select_all();
        let Ok(Dispatch::Submitted(req)) = vm.archive_selected() else {
            panic!("expected submission");
        };
        let failed = Err(BackendError::Aborted("conflict".into()));
        vm.handle_mutation_outcome(req, failed, Instant::now());
        assert!(matches!(vm.phase(), Phase::Failed { .. }));
        vm.set_category_filter(CategoryFilter::Only("meat".into()));
        assert_eq!(vm.phase(), &Phase::Idle);
        assert_eq!(vm.selection().len(), 1);

        let Ok(Dispatch::Submitted(req)) = vm.archive_selected() else {
            panic!("expected submission");
        };
        vm.handle_mutation_outcome(req, Err(BackendError::Aborted("again".into())), Instant::now());
        vm.toggle_sort(SortField::Quantity);
        assert!(vm.notice().is_none());
    }

    #[test]
    fn success_notice_is_timed_from_the_outcome() {
        let mut vm = signed_in();
        let t0 = Instant::now();
        vm.tick(t0);
        vm.select_all();
        let Ok(Dispatch::Submitted(req)) = vm.archive_selected() else {
            panic!("expected submission");
        };
        // no tick while the request is outstanding
        let resolved_at = t0 + Duration::from_secs(10);
        vm.handle_mutation_outcome(req, Ok(()), resolved_at);
        vm.tick(resolved_at + Duration::from_millis(1000));
        assert!(vm.notice().is_some());
        vm.tick(resolved_at + Duration::from_millis(3000));
        assert!(vm.notice().is_none());
    }

    #[test]
    fn outcome_after_identity_change_is_not_shown() {
        let mut vm = signed_in();
        vm.select_all();
        let Ok(Dispatch::Submitted(req)) = vm.archive_selected() else {
            panic!("expected submission");
        };
        vm.set_identity(Some(OwnerId::new("u2")));
        assert!(vm.is_busy());
        let sub = current_sub(&vm);
        vm.handle_feed_event(FeedEvent::snapshot(sub, vec![record("z", "u2", false, "dairy")]));
        vm.select_all();

        assert_eq!(
            vm.handle_mutation_outcome(req, Ok(()), Instant::now()),
            Some(Resolution::Superseded(BulkOperation::Archive))
        );
        assert!(!vm.is_busy());
        assert!(vm.notice().is_none());
        assert_eq!(vm.selection().len(), 1);
    }

    #[test]
    fn immediate_submit_failure_surfaces_backend_error() {
        let mut vm = signed_in();
        vm.backend_mut().offline = true;
        vm.select_all();
        let err = vm.archive_selected().expect_err("offline");
        assert!(matches!(err, ViewModelError::BackendUnavailable(_)));
        assert!(!vm.is_busy());
        assert_eq!(vm.selection().len(), 3);
    }

    #[test]
    fn mutations_require_identity() {
        let mut vm = Vm::new(ScriptedFeed::default(), ScriptedBackend::default());
        assert_eq!(vm.add_item(draft()), Err(ViewModelError::AuthRequired));
        assert_eq!(vm.archive_selected(), Err(ViewModelError::AuthRequired));
        assert!(vm.backend().submitted.is_empty());
    }

    #[test]
    fn empty_selection_is_rejected_locally() {
        let mut vm = signed_in();
        assert_eq!(vm.archive_selected(), Err(ViewModelError::EmptySelection));
        assert_eq!(vm.request_delete(), Err(ViewModelError::EmptySelection));
        assert!(vm.backend().submitted.is_empty());
    }

    #[test]
    fn unarchive_from_active_partition_is_rejected() {
        let mut vm = signed_in();
        vm.select_all();
        assert!(matches!(
            vm.unarchive_selected(),
            Err(ViewModelError::Validation(_))
        ));
    }

    #[test]
    fn add_validates_before_dispatch() {
        let mut vm = signed_in();
        let bad = ItemDraft {
            category_id: None,
            ..draft()
        };
        assert!(matches!(vm.add_item(bad), Err(ViewModelError::Validation(_))));
        assert!(matches!(vm.add_item(draft()), Ok(Dispatch::Submitted(_))));
        assert!(matches!(
            vm.backend().submitted[0],
            MutationRequest::AddItem { .. }
        ));
    }

    #[test]
    fn edit_of_missing_item_is_stale() {
        let mut vm = signed_in();
        let patch = ItemPatch {
            quantity: Some(9.0),
            ..ItemPatch::default()
        };
        assert_eq!(
            vm.edit_item(&ItemId::new("zzz"), patch),
            Err(ViewModelError::StaleReference(ItemId::new("zzz")))
        );
    }

    #[test]
    fn delete_needs_confirmation_and_skips_vanished_ids() {
        let mut vm = signed_in();
        vm.select_all();
        let confirmation = vm.request_delete().expect("confirmation");
        assert_eq!(confirmation.len(), 3);
        assert!(vm.backend().submitted.is_empty());

        let sub = current_sub(&vm);
        vm.handle_feed_event(FeedEvent::snapshot(sub, vec![record("a", "u1", false, "dairy")]));
        vm.confirm_delete(confirmation).expect("dispatch");
        let MutationRequest::DeleteItems { ids, .. } = &vm.backend().submitted[0] else {
            panic!("expected delete");
        };
        assert_eq!(ids, &vec![ItemId::new("a")]);
    }

    #[test]
    fn confirmation_from_previous_identity_is_refused() {
        let mut vm = signed_in();
        vm.select_all();
        let confirmation = vm.request_delete().expect("confirmation");
        vm.set_identity(Some(OwnerId::new("u2")));
        assert_eq!(vm.confirm_delete(confirmation), Err(ViewModelError::AuthRequired));
    }

    #[test]
    fn filter_change_prunes_selection() {
        let mut vm = signed_in();
        vm.select_all();
        vm.set_category_filter(CategoryFilter::Only("meat".into()));
        let selected: Vec<_> = vm.selection().iter().map(ItemId::as_str).collect();
        assert_eq!(selected, vec!["b"]);
    }

    #[test]
    fn toggle_sort_flips_direction_on_same_field() {
        let mut vm = signed_in();
        vm.toggle_sort(SortField::Name);
        assert_eq!(vm.view_state().direction, SortDirection::Desc);
        vm.toggle_sort(SortField::Quantity);
        assert_eq!(vm.view_state().sort_field, SortField::Quantity);
        assert_eq!(vm.view_state().direction, SortDirection::Asc);
    }

    #[test]
    fn drop_unsubscribes() {
        let mut feed = ScriptedFeed::default();
        {
            let mut vm = InventoryViewModel::new(&mut feed, ScriptedBackend::default());
            vm.set_identity(Some(OwnerId::new("u1")));
        }
        assert!(feed.live.is_empty());
        assert_eq!(feed.log.last().map(String::as_str), Some("unsub 1"));
    }
}
