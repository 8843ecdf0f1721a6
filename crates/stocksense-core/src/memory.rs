//! In-memory stand-in for the hosted document store.
//!
//! [`InMemoryStore`] keeps documents as loosely typed JSON, the way the
//! hosted platform does, and queues everything it would push: snapshots,
//! feed errors and mutation outcomes. Nothing is delivered until the host
//! drains the queues, which lets tests and the simulator control timing.
//!
//! Queued events are not withdrawn on unsubscribe, so late delivery for a
//! torn-down subscription can be exercised.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, trace};

use crate::backend::{Backend, BackendError, MutationRequest, RequestId};
use crate::export::{ExportFormat, ExportRow, Exporter};
use crate::feed::{FeedError, FeedEvent, LiveFeed, SubscriptionId, SubscriptionKey};
use crate::model::{CategoryId, ItemDraft, ItemId, ItemPatch, OwnerId};
use crate::viewmodel::InventoryViewModel;

pub type Outcome = (RequestId, Result<(), BackendError>);

#[derive(Debug)]
pub struct InMemoryStore {
    docs: BTreeMap<ItemId, Value>,
    subscriptions: BTreeMap<SubscriptionId, SubscriptionKey>,
    pending: VecDeque<(RequestId, MutationRequest)>,
    events: VecDeque<FeedEvent>,
    outcomes: VecDeque<Outcome>,
    next_subscription: u64,
    next_request: u64,
    next_doc: u64,
    /// Logical clock; every committed write advances it by one second.
    clock: DateTime<Utc>,
    subscribe_failure: Option<FeedError>,
    submit_failure: Option<BackendError>,
}

impl InMemoryStore {
    #[must_use]
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            docs: BTreeMap::new(),
            subscriptions: BTreeMap::new(),
            pending: VecDeque::new(),
            events: VecDeque::new(),
            outcomes: VecDeque::new(),
            next_subscription: 0,
            next_request: 0,
            next_doc: 0,
            clock: start,
            subscribe_failure: None,
            submit_failure: None,
        }
    }

    fn tick_clock(&mut self) -> DateTime<Utc> {
        self.clock += Duration::seconds(1);
        self.clock
    }

    fn fresh_id(&mut self) -> ItemId {
        self.next_doc += 1;
        ItemId::new(format!("item-{:05}", self.next_doc))
    }

    /// Create a document directly, bypassing the mutation queue. Live
    /// subscriptions for the owner are notified.
    pub fn seed(&mut self, owner: &OwnerId, draft: &ItemDraft, archived: bool) -> ItemId {
        let id = self.fresh_id();
        let now = self.tick_clock();
        self.docs
            .insert(id.clone(), document(&id, owner, draft, archived, now));
        self.broadcast(owner);
        id
    }

    /// Store a raw record as-is, well-formed or not.
    pub fn insert_raw(&mut self, id: impl Into<ItemId>, record: Value) {
        self.docs.insert(id.into(), record);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Records matching `key`, in id order. Records without an `archived`
    /// field count as active.
    #[must_use]
    pub fn query(&self, key: &SubscriptionKey) -> Vec<Value> {
        self.docs
            .values()
            .filter(|doc| {
                let owner = doc
                    .get("ownerId")
                    .or_else(|| doc.get("userId"))
                    .and_then(Value::as_str);
                let archived = doc.get("archived").and_then(Value::as_bool).unwrap_or(false);
                owner == Some(key.owner.as_str()) && archived == key.archived
            })
            .cloned()
            .collect()
    }

    /// Items of `owner`, in either partition, that reference `category`.
    #[must_use]
    pub fn count_in_category(&self, owner: &OwnerId, category: &CategoryId) -> usize {
        [false, true]
            .into_iter()
            .flat_map(|archived| self.query(&SubscriptionKey::new(owner.clone(), archived)))
            .filter(|doc| doc.get("categoryId").and_then(Value::as_str) == Some(category.as_str()))
            .count()
    }

    #[must_use]
    pub fn live_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Make the next `subscribe` calls fail with `error` until cleared.
    pub fn fail_subscribe(&mut self, error: Option<FeedError>) {
        self.subscribe_failure = error;
    }

    /// Make the next `submit` calls fail with `error` until cleared.
    pub fn fail_submit(&mut self, error: Option<BackendError>) {
        self.submit_failure = error;
    }

    fn broadcast(&mut self, owner: &OwnerId) {
        let targets: Vec<(SubscriptionId, SubscriptionKey)> = self
            .subscriptions
            .iter()
            .filter(|(_, key)| &key.owner == owner)
            .map(|(id, key)| (*id, key.clone()))
            .collect();
        for (id, key) in targets {
            let records = self.query(&key);
            trace!(subscription = %id, records = records.len(), "snapshot queued");
            self.events.push_back(FeedEvent::snapshot(id, records));
        }
    }

    /// Queue a feed error for a subscription.
    pub fn push_feed_error(&mut self, subscription: SubscriptionId, error: FeedError) {
        self.events.push_back(FeedEvent::error(subscription, error));
    }

    /// Commit the oldest pending request. Batches are all-or-nothing: one
    /// missing or foreign id fails the whole request and nothing changes.
    pub fn commit_next(&mut self) -> Option<RequestId> {
        let (id, request) = self.pending.pop_front()?;
        let owner = request.owner().clone();
        let result = self.apply(request);
        debug!(request = %id, ok = result.is_ok(), "mutation resolved");
        if result.is_ok() {
            self.broadcast(&owner);
        }
        self.outcomes.push_back((id, result));
        Some(id)
    }

    /// Fail the oldest pending request without applying it.
    pub fn reject_next(&mut self, error: BackendError) -> Option<RequestId> {
        let (id, _) = self.pending.pop_front()?;
        debug!(request = %id, "mutation rejected: {error}");
        self.outcomes.push_back((id, Err(error)));
        Some(id)
    }

    /// Commit every pending request in order.
    pub fn commit_all(&mut self) -> usize {
        let mut n = 0;
        while self.commit_next().is_some() {
            n += 1;
        }
        n
    }

    pub fn take_events(&mut self) -> Vec<FeedEvent> {
        self.events.drain(..).collect()
    }

    pub fn take_outcomes(&mut self) -> Vec<Outcome> {
        self.outcomes.drain(..).collect()
    }

    fn owned(&self, owner: &OwnerId, ids: &[ItemId]) -> Result<(), BackendError> {
        for id in ids {
            let doc_owner = self
                .docs
                .get(id)
                .and_then(|doc| doc.get("ownerId"))
                .and_then(Value::as_str);
            match doc_owner {
                None => return Err(BackendError::Aborted(format!("document {id} not found"))),
                Some(o) if o != owner.as_str() => {
                    return Err(BackendError::PermissionDenied(format!(
                        "document {id} belongs to another user"
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn apply(&mut self, request: MutationRequest) -> Result<(), BackendError> {
        match request {
            MutationRequest::AddItem { owner, draft } => {
                let id = self.fresh_id();
                let now = self.tick_clock();
                self.docs
                    .insert(id.clone(), document(&id, &owner, &draft, false, now));
            }
            MutationRequest::UpdateItem { owner, id, patch } => {
                self.owned(&owner, std::slice::from_ref(&id))?;
                let now = self.tick_clock();
                if let Some(Value::Object(doc)) = self.docs.get_mut(&id) {
                    apply_patch(doc, &patch, now);
                }
            }
            MutationRequest::DeleteItems { owner, ids } => {
                self.owned(&owner, &ids)?;
                for id in &ids {
                    self.docs.remove(id);
                }
            }
            MutationRequest::SetArchived {
                owner,
                ids,
                archived,
            } => {
                self.owned(&owner, &ids)?;
                let now = self.tick_clock();
                for id in &ids {
                    if let Some(Value::Object(doc)) = self.docs.get_mut(id) {
                        doc.insert("archived".into(), Value::Bool(archived));
                        doc.insert("lastUpdated".into(), timestamp(now));
                    }
                }
            }
        }
        Ok(())
    }
}

impl LiveFeed for InMemoryStore {
    fn subscribe(&mut self, key: &SubscriptionKey) -> Result<SubscriptionId, FeedError> {
        if let Some(err) = &self.subscribe_failure {
            return Err(err.clone());
        }
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.subscriptions.insert(id, key.clone());
        let records = self.query(key);
        self.events.push_back(FeedEvent::snapshot(id, records));
        Ok(id)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscriptions.remove(&id);
    }
}

impl Backend for InMemoryStore {
    fn submit(&mut self, request: MutationRequest) -> Result<RequestId, BackendError> {
        if let Some(err) = &self.submit_failure {
            return Err(err.clone());
        }
        self.next_request += 1;
        let id = RequestId(self.next_request);
        self.pending.push_back((id, request));
        Ok(id)
    }
}

/// Firestore-style `{seconds, nanoseconds}` timestamp.
fn timestamp(at: DateTime<Utc>) -> Value {
    json!({ "seconds": at.timestamp(), "nanoseconds": at.timestamp_subsec_nanos() })
}

fn document(
    id: &ItemId,
    owner: &OwnerId,
    draft: &ItemDraft,
    archived: bool,
    now: DateTime<Utc>,
) -> Value {
    json!({
        "id": id.as_str(),
        "name": draft.name,
        "categoryId": draft.category_id.as_ref().map(CategoryId::as_str),
        "quantity": draft.quantity,
        "unit": draft.unit,
        "reorderPoint": draft.reorder_point,
        "expirationDate": draft
            .expiration_date
            .map(|d| d.to_rfc3339_opts(SecondsFormat::Millis, true)),
        "lastUpdated": timestamp(now),
        "ownerId": owner.as_str(),
        "archived": archived,
    })
}

fn apply_patch(doc: &mut Map<String, Value>, patch: &ItemPatch, now: DateTime<Utc>) {
    if let Some(name) = &patch.name {
        doc.insert("name".into(), json!(name));
    }
    if let Some(category) = &patch.category_id {
        doc.insert("categoryId".into(), json!(category.as_str()));
    }
    if let Some(quantity) = patch.quantity {
        doc.insert("quantity".into(), json!(quantity));
    }
    if let Some(unit) = &patch.unit {
        doc.insert("unit".into(), json!(unit));
    }
    if let Some(reorder_point) = patch.reorder_point {
        doc.insert("reorderPoint".into(), json!(reorder_point));
    }
    if let Some(expiration) = patch.expiration_date {
        doc.insert(
            "expirationDate".into(),
            json!(expiration.map(|d| d.to_rfc3339_opts(SecondsFormat::Millis, true))),
        );
    }
    doc.insert("lastUpdated".into(), timestamp(now));
}

/// A cloneable handle so one store can serve as both feed and backend.
#[derive(Debug, Clone)]
pub struct SharedStore(Rc<RefCell<InMemoryStore>>);

impl SharedStore {
    #[must_use]
    pub fn new(store: InMemoryStore) -> Self {
        Self(Rc::new(RefCell::new(store)))
    }

    /// Run `f` with the store borrowed mutably.
    pub fn with<R>(&self, f: impl FnOnce(&mut InMemoryStore) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }
}

impl LiveFeed for SharedStore {
    fn subscribe(&mut self, key: &SubscriptionKey) -> Result<SubscriptionId, FeedError> {
        self.0.borrow_mut().subscribe(key)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.0.borrow_mut().unsubscribe(id);
    }
}

impl Backend for SharedStore {
    fn submit(&mut self, request: MutationRequest) -> Result<RequestId, BackendError> {
        self.0.borrow_mut().submit(request)
    }
}

/// Deliver every queued event and outcome to `vm`, repeating until the
/// store has nothing left to push. Outcomes are stamped with the current
/// instant. Returns the number of deliveries.
pub fn pump<F: LiveFeed, B: Backend>(
    store: &SharedStore,
    vm: &mut InventoryViewModel<F, B>,
) -> usize {
    let mut delivered = 0;
    loop {
        let (events, outcomes) = store.with(|s| (s.take_events(), s.take_outcomes()));
        if events.is_empty() && outcomes.is_empty() {
            return delivered;
        }
        for (request, outcome) in outcomes {
            vm.handle_mutation_outcome(request, outcome, Instant::now());
            delivered += 1;
        }
        for event in events {
            vm.handle_feed_event(event);
            delivered += 1;
        }
    }
}

/// Exporter that keeps every export in memory.
#[derive(Debug, Default)]
pub struct CollectingExporter {
    pub exports: Vec<(Vec<ExportRow>, ExportFormat)>,
    /// When set, every write fails with this message.
    pub fail_with: Option<String>,
}

impl Exporter for CollectingExporter {
    type Error = String;

    fn write(&mut self, rows: &[ExportRow], format: ExportFormat) -> Result<(), Self::Error> {
        if let Some(msg) = &self.fail_with {
            return Err(msg.clone());
        }
        self.exports.push((rows.to_vec(), format));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0)
            .single()
            .expect("valid timestamp")
    }

    fn draft(name: &str) -> ItemDraft {
        ItemDraft {
            name: name.to_string(),
            category_id: Some("dairy".into()),
            quantity: 4.0,
            unit: "l".to_string(),
            reorder_point: 1.0,
            expiration_date: None,
        }
    }

    #[test]
    fn subscribe_queues_initial_snapshot() {
        let mut store = InMemoryStore::new(start());
        let owner = OwnerId::new("u1");
        store.seed(&owner, &draft("Milk"), false);
        store.seed(&owner, &draft("Old milk"), true);
        store.seed(&OwnerId::new("u2"), &draft("Other"), false);

        let sub = store
            .subscribe(&SubscriptionKey::new("u1", false))
            .expect("subscribe");
        let events = store.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subscription, sub);
        let crate::feed::FeedPayload::Snapshot(records) = &events[0].payload else {
            panic!("expected snapshot");
        };
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["name"], "Milk");
    }

    #[test]
    fn batch_with_missing_id_changes_nothing() {
        let mut store = InMemoryStore::new(start());
        let owner = OwnerId::new("u1");
        let a = store.seed(&owner, &draft("A"), false);
        store
            .submit(MutationRequest::SetArchived {
                owner: owner.clone(),
                ids: vec![a.clone(), ItemId::new("ghost")],
                archived: true,
            })
            .expect("submit");
        store.commit_next();
        let outcomes = store.take_outcomes();
        assert!(matches!(outcomes[0].1, Err(BackendError::Aborted(_))));
        assert_eq!(store.query(&SubscriptionKey::new(owner, false)).len(), 1);
    }

    #[test]
    fn foreign_ids_are_refused() {
        let mut store = InMemoryStore::new(start());
        let a = store.seed(&OwnerId::new("u2"), &draft("A"), false);
        store
            .submit(MutationRequest::DeleteItems {
                owner: OwnerId::new("u1"),
                ids: vec![a],
            })
            .expect("submit");
        store.commit_next();
        assert!(matches!(
            store.take_outcomes()[0].1,
            Err(BackendError::PermissionDenied(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn commit_broadcasts_to_owner_subscriptions_only() {
        let mut store = InMemoryStore::new(start());
        store
            .subscribe(&SubscriptionKey::new("u1", false))
            .expect("subscribe");
        store
            .subscribe(&SubscriptionKey::new("u2", false))
            .expect("subscribe");
        store.take_events();
        store
            .submit(MutationRequest::AddItem {
                owner: OwnerId::new("u1"),
                draft: draft("Cream"),
            })
            .expect("submit");
        store.commit_all();
        let events = store.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subscription, SubscriptionId(1));
    }

    #[test]
    fn queued_events_survive_unsubscribe() {
        let mut store = InMemoryStore::new(start());
        let sub = store
            .subscribe(&SubscriptionKey::new("u1", false))
            .expect("subscribe");
        store.unsubscribe(sub);
        assert_eq!(store.live_subscriptions(), 0);
        assert_eq!(store.take_events().len(), 1);
    }

    #[test]
    fn patch_updates_fields_and_stamps_time() {
        let mut store = InMemoryStore::new(start());
        let owner = OwnerId::new("u1");
        let id = store.seed(&owner, &draft("Milk"), false);
        store
            .submit(MutationRequest::UpdateItem {
                owner: owner.clone(),
                id,
                patch: ItemPatch {
                    quantity: Some(9.0),
                    ..ItemPatch::default()
                },
            })
            .expect("submit");
        store.commit_next();
        let docs = store.query(&SubscriptionKey::new(owner, false));
        assert_eq!(docs[0]["quantity"], 9.0);
        assert_eq!(docs[0]["lastUpdated"]["seconds"], 1_700_000_002_i64);
    }

    #[test]
    fn category_usage_spans_partitions() {
        let mut store = InMemoryStore::new(start());
        let owner = OwnerId::new("u1");
        store.seed(&owner, &draft("A"), false);
        store.seed(&owner, &draft("B"), true);
        assert_eq!(store.count_in_category(&owner, &CategoryId::new("dairy")), 2);
        assert_eq!(store.count_in_category(&owner, &CategoryId::new("meat")), 0);
    }
}
