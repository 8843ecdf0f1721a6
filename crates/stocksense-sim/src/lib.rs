//! stocksense-sim library.
//!
//! Deterministic simulation of one user session against an in-memory store:
//! random user actions, delayed and interleaved feed delivery, rejected
//! batches and feed errors, with invariants checked after every round and
//! convergence checked once everything has drained.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod actor;
pub mod campaign;
pub mod delivery;
pub mod oracle;
pub mod rng;

use std::time::{Duration as StdDuration, Instant};

use anyhow::{Result, bail};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;
use stocksense_core::InventoryViewModel;
use stocksense_core::backend::BackendError;
use stocksense_core::bulk::Resolution;
use stocksense_core::categories::{CategoryBook, CategoryDirectory};
use stocksense_core::config::StockSenseConfig;
use stocksense_core::feed::{FeedError, FeedPayload};
use stocksense_core::memory::{InMemoryStore, SharedStore};
use stocksense_core::model::{CategoryId, ItemDraft, OwnerId};
use tracing::{debug, info, trace};

use crate::actor::{ActionResult, OWNERS, UserAction, UserActor};
use crate::delivery::{Channel, Delivery, DeliveryQueue, FaultConfig};
use crate::oracle::{OracleResult, QuiescenceOracle, StepOracle};
use crate::rng::DeterministicRng;

const SEED_NAMES: [&str; 6] = ["Milk", "Beef", "Butter", "Flour", "Apples", "Rice"];
const MAX_DRAIN_PASSES: usize = 16;

/// Parameters for one simulated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub rounds: u64,
    /// Items seeded per owner before the session starts.
    pub items_per_owner: usize,
    /// Simulated time between rounds.
    pub tick_ms: u64,
    pub fault: FaultConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            rounds: 64,
            items_per_owner: 4,
            tick_ms: 500,
            fault: FaultConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEventKind {
    Action {
        action: UserAction,
        result: ActionResult,
    },
    Commit {
        request: u64,
    },
    Reject {
        request: u64,
    },
    FeedFault {
        subscription: u64,
    },
    Deliver {
        channel: String,
        applied: bool,
    },
    Resubscribe,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEvent {
    pub round: u64,
    #[serde(flatten)]
    pub kind: TraceEventKind,
}

/// Counters for the fault paths a run went through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SimulationStats {
    pub actions: usize,
    pub submitted: usize,
    pub busy_rejections: usize,
    pub local_rejections: usize,
    pub exports: usize,
    pub commits: usize,
    pub backend_rejections: usize,
    pub succeeded_batches: usize,
    pub failed_batches: usize,
    /// Outcomes that arrived after the issuing identity was replaced.
    pub superseded_batches: usize,
    pub feed_errors: usize,
    pub stale_deliveries: usize,
    pub reordered_rounds: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub seed: u64,
    pub rounds: u64,
    pub trace: Vec<TraceEvent>,
    pub stats: SimulationStats,
    /// Per-round and quiescence checks combined.
    pub oracle: OracleResult,
    pub final_items: usize,
    /// Whether the run hit a stale delivery, a failed or superseded batch,
    /// a feed error or a busy rejection.
    pub interesting_state_reached: bool,
}

pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    store: SharedStore,
    vm: InventoryViewModel<SharedStore, SharedStore>,
    actor: UserActor,
    queue: DeliveryQueue,
    trace: Vec<TraceEvent>,
    stats: SimulationStats,
    oracle: OracleResult,
    epoch: Instant,
    /// Instant of the current round.
    clock: Instant,
    wall_start: DateTime<Utc>,
}

impl Simulator {
    /// Simulator with default view-model settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot produce a run.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        Self::with_settings(config, StockSenseConfig::default())
    }

    /// # Errors
    ///
    /// Returns an error if the configuration cannot produce a run.
    pub fn with_settings(config: SimulationConfig, settings: StockSenseConfig) -> Result<Self> {
        if config.rounds == 0 {
            bail!("rounds must be > 0");
        }
        if config.tick_ms == 0 {
            bail!("tick_ms must be > 0");
        }
        let Some(wall_start) = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).single() else {
            bail!("invalid simulation start time");
        };

        let mut rng = DeterministicRng::new(config.seed);
        let book = CategoryBook::with_defaults(settings.categories.clone());
        let categories: Vec<CategoryId> = book
            .active_categories()
            .into_iter()
            .map(|category| category.id)
            .collect();

        let mut inner = InMemoryStore::new(wall_start);
        for owner in OWNERS {
            let owner = OwnerId::new(owner);
            for index in 0..config.items_per_owner {
                let draft = ItemDraft {
                    name: SEED_NAMES[index % SEED_NAMES.len()].to_string(),
                    category_id: rng.pick(&categories).cloned(),
                    quantity: rng.next_amount(0, 12),
                    unit: "pcs".to_string(),
                    reorder_point: rng.next_amount(0, 5),
                    expiration_date: None,
                };
                inner.seed(&owner, &draft, index % 4 == 3);
            }
        }
        let store = SharedStore::new(inner);

        let mut vm = InventoryViewModel::with_config(store.clone(), store.clone(), settings);
        vm.refresh_categories(&book);
        let epoch = Instant::now();

        Ok(Self {
            config,
            rng,
            store,
            vm,
            actor: UserActor::new(categories),
            queue: DeliveryQueue::new(config.fault),
            trace: Vec::new(),
            stats: SimulationStats::default(),
            oracle: OracleResult::pass(),
            epoch,
            clock: epoch,
            wall_start,
        })
    }

    /// Run every round, drain, then check convergence.
    ///
    /// # Errors
    ///
    /// Does not fail once the simulator has been constructed.
    pub fn run(&mut self) -> Result<SimulationResult> {
        for round in 0..self.config.rounds {
            self.step(round);
        }
        self.drain(self.config.rounds);

        let quiescent = self
            .store
            .with(|store| QuiescenceOracle::check_all(&self.vm, store));
        let oracle = std::mem::replace(&mut self.oracle, OracleResult::pass()).merge(quiescent);
        let stats = self.stats;
        let interesting_state_reached = stats.stale_deliveries > 0
            || stats.failed_batches > 0
            || stats.superseded_batches > 0
            || stats.feed_errors > 0
            || stats.busy_rejections > 0;

        info!(
            seed = self.config.seed,
            passed = oracle.passed,
            actions = stats.actions,
            commits = stats.commits,
            "simulation finished"
        );

        Ok(SimulationResult {
            seed: self.config.seed,
            rounds: self.config.rounds,
            trace: std::mem::take(&mut self.trace),
            stats,
            oracle,
            final_items: self.vm.items().len(),
            interesting_state_reached,
        })
    }

    fn step(&mut self, round: u64) {
        let elapsed = round.saturating_mul(self.config.tick_ms);
        self.clock = self.epoch + StdDuration::from_millis(elapsed);
        self.vm.tick(self.clock);
        self.actor.set_now(
            self.wall_start + Duration::milliseconds(i64::try_from(elapsed).unwrap_or(i64::MAX)),
        );

        self.act(round);
        self.run_backend(round);
        self.inject_feed_fault(round);
        self.collect(round);

        let out = self.queue.deliver_ready(round, &mut self.rng);
        if out.reordered {
            self.stats.reordered_rounds += 1;
        }
        for delivery in out.delivered {
            self.apply(round, delivery);
        }

        let outstanding = self.outstanding();
        let checked = StepOracle::check_all(round, &self.vm, outstanding);
        if !checked.passed {
            debug!(round, violations = checked.violations.len(), "invariant violated");
        }
        self.oracle = std::mem::replace(&mut self.oracle, OracleResult::pass()).merge(checked);
    }

    fn act(&mut self, round: u64) {
        let fault = self.config.fault;
        let submit_failure = self.rng.hit_rate_percent(fault.submit_failure_rate_percent);
        let subscribe_failure = self
            .rng
            .hit_rate_percent(fault.subscribe_failure_rate_percent);
        self.store.with(|store| {
            if submit_failure {
                store.fail_submit(Some(BackendError::Unavailable("service restarting".into())));
            }
            if subscribe_failure {
                store.fail_subscribe(Some(FeedError::Unavailable("listener refused".into())));
            }
        });

        let action = self.actor.choose(&self.vm, &mut self.rng);
        let result = self.actor.perform(&mut self.vm, &action);

        self.store.with(|store| {
            store.fail_submit(None);
            store.fail_subscribe(None);
        });

        self.stats.actions += 1;
        match &result {
            ActionResult::Submitted { .. } => self.stats.submitted += 1,
            ActionResult::Busy => self.stats.busy_rejections += 1,
            ActionResult::Rejected { .. } => self.stats.local_rejections += 1,
            ActionResult::Exported => self.stats.exports += 1,
            ActionResult::Done => {}
        }
        trace!(round, ?action, ?result, "user action");
        self.trace.push(TraceEvent {
            round,
            kind: TraceEventKind::Action { action, result },
        });
    }

    fn run_backend(&mut self, round: u64) {
        if self.store.with(|store| store.pending_len()) == 0 || !self.rng.hit_rate_percent(50) {
            return;
        }
        if self.rng.hit_rate_percent(self.config.fault.reject_rate_percent) {
            let rejected = self.store.with(|store| {
                store.reject_next(BackendError::Unavailable("write quota exceeded".into()))
            });
            if let Some(request) = rejected {
                self.stats.backend_rejections += 1;
                self.trace.push(TraceEvent {
                    round,
                    kind: TraceEventKind::Reject { request: request.0 },
                });
            }
        } else if let Some(request) = self.store.with(InMemoryStore::commit_next) {
            self.stats.commits += 1;
            self.trace.push(TraceEvent {
                round,
                kind: TraceEventKind::Commit { request: request.0 },
            });
        }
    }

    fn inject_feed_fault(&mut self, round: u64) {
        let Some(subscription) = self.vm.subscription().map(|active| active.id) else {
            return;
        };
        if !self
            .rng
            .hit_rate_percent(self.config.fault.feed_error_rate_percent)
        {
            return;
        }
        self.store.with(|store| {
            store.push_feed_error(
                subscription,
                FeedError::Unavailable("listener disconnected".into()),
            );
        });
        self.trace.push(TraceEvent {
            round,
            kind: TraceEventKind::FeedFault {
                subscription: subscription.0,
            },
        });
    }

    /// Move everything the store pushed into the delivery queue.
    fn collect(&mut self, round: u64) {
        let (events, outcomes) = self
            .store
            .with(|store| (store.take_events(), store.take_outcomes()));
        for outcome in outcomes {
            self.queue
                .enqueue(Delivery::Outcome(outcome), round, &mut self.rng);
        }
        for event in events {
            self.queue.enqueue(Delivery::Event(event), round, &mut self.rng);
        }
    }

    fn apply(&mut self, round: u64, delivery: Delivery) {
        let channel = match delivery.channel() {
            Channel::Outcomes => "outcomes".to_string(),
            Channel::Subscription(id) => format!("subscription-{id}"),
        };
        let applied = match delivery {
            Delivery::Event(event) => {
                let is_error = matches!(event.payload, FeedPayload::Error(_));
                let applied = self.vm.handle_feed_event(event);
                if !applied {
                    self.stats.stale_deliveries += 1;
                } else if is_error {
                    self.stats.feed_errors += 1;
                }
                applied
            }
            Delivery::Outcome((request, outcome)) => {
                match self.vm.handle_mutation_outcome(request, outcome, self.clock) {
                    Some(Resolution::Succeeded(_)) => {
                        self.stats.succeeded_batches += 1;
                        true
                    }
                    Some(Resolution::Failed(_)) => {
                        self.stats.failed_batches += 1;
                        true
                    }
                    Some(Resolution::Superseded(_)) => {
                        self.stats.superseded_batches += 1;
                        true
                    }
                    None => false,
                }
            }
        };
        self.trace.push(TraceEvent {
            round,
            kind: TraceEventKind::Deliver { channel, applied },
        });
    }

    /// Requests accepted by the backend whose outcome has not reached the
    /// view-model.
    fn outstanding(&self) -> usize {
        self.store.with(|store| store.pending_len()) + self.queue.outcomes_pending()
    }

    fn needs_resubscribe(&self) -> bool {
        self.vm.identity().is_some()
            && (self.vm.feed_error().is_some() || self.vm.subscription().is_none())
    }

    /// Commit everything, deliver everything, and reconnect a failed
    /// listener the way a host retry would.
    fn drain(&mut self, round: u64) {
        for pass in 0..MAX_DRAIN_PASSES {
            if self.needs_resubscribe() {
                self.vm.resubscribe();
                self.trace.push(TraceEvent {
                    round,
                    kind: TraceEventKind::Resubscribe,
                });
            }
            while let Some(request) = self.store.with(InMemoryStore::commit_next) {
                self.stats.commits += 1;
                self.trace.push(TraceEvent {
                    round,
                    kind: TraceEventKind::Commit { request: request.0 },
                });
            }
            self.collect(round);
            for delivery in self.queue.drain_all() {
                self.apply(round, delivery);
            }
            let settled = self.outstanding() == 0
                && self.queue.is_empty()
                && !self.needs_resubscribe()
                && !self.vm.is_loading();
            if settled {
                debug!(pass, "drained");
                return;
            }
        }
        debug!("drain gave up after {MAX_DRAIN_PASSES} passes");
    }
}
