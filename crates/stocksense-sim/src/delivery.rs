use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use stocksense_core::feed::{FeedEvent, SubscriptionId};
use stocksense_core::memory::Outcome;

use crate::rng::DeterministicRng;

/// Fault injection knobs for one simulated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Maximum delivery delay in rounds.
    pub max_delay_rounds: u8,
    /// Chance per round of interleaving ready deliveries across channels.
    pub reorder_rate_percent: u8,
    /// Chance a committed request is rejected by the backend instead.
    pub reject_rate_percent: u8,
    /// Chance per round of the feed pushing an error to the live subscription.
    pub feed_error_rate_percent: u8,
    /// Chance a user action finds the backend refusing new requests.
    pub submit_failure_rate_percent: u8,
    /// Chance a user action finds the feed refusing new subscriptions.
    pub subscribe_failure_rate_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            max_delay_rounds: 2,
            reorder_rate_percent: 10,
            reject_rate_percent: 10,
            feed_error_rate_percent: 3,
            submit_failure_rate_percent: 3,
            subscribe_failure_rate_percent: 3,
        }
    }
}

impl FaultConfig {
    /// No faults: every delivery arrives in the round it was queued, in order.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_delay_rounds: 0,
            reorder_rate_percent: 0,
            reject_rate_percent: 0,
            feed_error_rate_percent: 0,
            submit_failure_rate_percent: 0,
            subscribe_failure_rate_percent: 0,
        }
    }
}

/// Ordering domain. Deliveries on one channel are never reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    Outcomes,
    Subscription(SubscriptionId),
}

/// Something the store pushed that the view-model has not seen yet.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Event(FeedEvent),
    Outcome(Outcome),
}

impl Delivery {
    #[must_use]
    pub const fn channel(&self) -> Channel {
        match self {
            Self::Event(event) => Channel::Subscription(event.subscription),
            Self::Outcome(_) => Channel::Outcomes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Pending {
    deliver_at_round: u64,
    seq: u64,
    delivery: Delivery,
}

/// Deliveries released for a round.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliverOutcome {
    pub delivered: Vec<Delivery>,
    /// Whether channels were interleaved out of enqueue order.
    pub reordered: bool,
}

/// Delayed, per-channel ordered delivery between the store and the view-model.
///
/// A live listener sees its own snapshots in order, and so does the
/// mutation channel; nothing orders one channel against another.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    fault: FaultConfig,
    pending: Vec<Pending>,
    next_seq: u64,
    channel_floor: BTreeMap<Channel, u64>,
}

impl DeliveryQueue {
    #[must_use]
    pub const fn new(fault: FaultConfig) -> Self {
        Self {
            fault,
            pending: Vec::new(),
            next_seq: 0,
            channel_floor: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Outcomes queued but not yet delivered.
    #[must_use]
    pub fn outcomes_pending(&self) -> usize {
        self.pending
            .iter()
            .filter(|p| matches!(p.delivery, Delivery::Outcome(_)))
            .count()
    }

    /// Queue `delivery` for a later round. Returns the round it becomes ready.
    pub fn enqueue(&mut self, delivery: Delivery, round: u64, rng: &mut DeterministicRng) -> u64 {
        let delay = rng.next_bounded(u64::from(self.fault.max_delay_rounds) + 1);
        let channel = delivery.channel();
        let floor = self.channel_floor.get(&channel).copied().unwrap_or(0);
        let deliver_at_round = (round + delay).max(floor);
        self.channel_floor.insert(channel, deliver_at_round);

        self.next_seq += 1;
        self.pending.push(Pending {
            deliver_at_round,
            seq: self.next_seq,
            delivery,
        });
        deliver_at_round
    }

    /// Release everything due by `round`.
    pub fn deliver_ready(&mut self, round: u64, rng: &mut DeterministicRng) -> DeliverOutcome {
        let (mut ready, waiting): (Vec<Pending>, Vec<Pending>) = self
            .pending
            .drain(..)
            .partition(|p| p.deliver_at_round <= round);
        self.pending = waiting;
        ready.sort_by_key(|p| p.seq);

        let mut reordered = false;
        if ready.len() > 1 && rng.hit_rate_percent(self.fault.reorder_rate_percent) {
            let mut rank: BTreeMap<Channel, u64> = BTreeMap::new();
            for p in &ready {
                rank.entry(p.delivery.channel())
                    .or_insert_with(|| rng.next_u64());
            }
            if rank.len() > 1 {
                // Stable sort keeps each channel's own order intact.
                ready.sort_by_key(|p| rank.get(&p.delivery.channel()).copied().unwrap_or(0));
                reordered = true;
            }
        }

        DeliverOutcome {
            delivered: ready.into_iter().map(|p| p.delivery).collect(),
            reordered,
        }
    }

    /// Release everything regardless of delay, in enqueue order.
    pub fn drain_all(&mut self) -> Vec<Delivery> {
        let mut all: Vec<Pending> = self.pending.drain(..).collect();
        all.sort_by_key(|p| p.seq);
        all.into_iter().map(|p| p.delivery).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stocksense_core::backend::RequestId;

    fn snapshot(sub: u64, marker: u64) -> Delivery {
        Delivery::Event(FeedEvent::snapshot(
            SubscriptionId(sub),
            vec![serde_json::json!({ "marker": marker })],
        ))
    }

    fn marker(delivery: &Delivery) -> Option<u64> {
        match delivery {
            Delivery::Event(FeedEvent {
                payload: stocksense_core::feed::FeedPayload::Snapshot(records),
                ..
            }) => records.first().and_then(|r| r["marker"].as_u64()),
            _ => None,
        }
    }

    #[test]
    fn zero_delay_delivers_same_round() {
        let mut rng = DeterministicRng::new(1);
        let mut queue = DeliveryQueue::new(FaultConfig::none());
        assert_eq!(queue.enqueue(snapshot(1, 0), 4, &mut rng), 4);
        let out = queue.deliver_ready(4, &mut rng);
        assert_eq!(out.delivered.len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn later_snapshot_never_overtakes_earlier_one() {
        let fault = FaultConfig {
            max_delay_rounds: 5,
            reorder_rate_percent: 100,
            ..FaultConfig::none()
        };
        for seed in 0..50 {
            let mut rng = DeterministicRng::new(seed);
            let mut queue = DeliveryQueue::new(fault);
            for (round, m) in (0..10).zip(0..) {
                queue.enqueue(snapshot(1, m), round, &mut rng);
                queue.enqueue(snapshot(2, 100 + m), round, &mut rng);
            }
            let mut seen_1 = Vec::new();
            let mut seen_2 = Vec::new();
            for round in 0..20 {
                for d in queue.deliver_ready(round, &mut rng).delivered {
                    match d.channel() {
                        Channel::Subscription(SubscriptionId(1)) => seen_1.extend(marker(&d)),
                        _ => seen_2.extend(marker(&d)),
                    }
                }
            }
            assert_eq!(seen_1, (0..10).collect::<Vec<_>>(), "seed {seed}");
            assert_eq!(seen_2, (100..110).collect::<Vec<_>>(), "seed {seed}");
        }
    }

    #[test]
    fn reorder_interleaves_channels() {
        let fault = FaultConfig {
            reorder_rate_percent: 100,
            ..FaultConfig::none()
        };
        let reordered_somewhere = (0..20).any(|seed| {
            let mut rng = DeterministicRng::new(seed);
            let mut queue = DeliveryQueue::new(fault);
            queue.enqueue(snapshot(1, 1), 0, &mut rng);
            queue.enqueue(Delivery::Outcome((RequestId(1), Ok(()))), 0, &mut rng);
            let out = queue.deliver_ready(0, &mut rng);
            out.reordered && matches!(out.delivered[0], Delivery::Outcome(_))
        });
        assert!(reordered_somewhere);
    }

    #[test]
    fn outcomes_pending_counts_only_outcomes() {
        let mut rng = DeterministicRng::new(2);
        let mut queue = DeliveryQueue::new(FaultConfig {
            max_delay_rounds: 3,
            ..FaultConfig::none()
        });
        queue.enqueue(snapshot(1, 1), 0, &mut rng);
        queue.enqueue(Delivery::Outcome((RequestId(7), Ok(()))), 0, &mut rng);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.outcomes_pending(), 1);
        assert_eq!(queue.drain_all().len(), 2);
        assert_eq!(queue.outcomes_pending(), 0);
    }

    proptest::proptest! {
        #[test]
        fn every_enqueued_delivery_arrives_once(
            seed in 0_u64..10_000,
            max_delay in 0_u8..6,
            reorder in 0_u8..=100,
            channels in proptest::collection::vec(0_u64..4, 1..40),
        ) {
            let mut rng = DeterministicRng::new(seed);
            let mut queue = DeliveryQueue::new(FaultConfig {
                max_delay_rounds: max_delay,
                reorder_rate_percent: reorder,
                ..FaultConfig::none()
            });
            for (round, (sub, m)) in (0_u64..).zip(channels.iter().zip(0_u64..)) {
                queue.enqueue(snapshot(*sub, m), round / 3, &mut rng);
            }
            let mut seen: BTreeMap<Channel, Vec<u64>> = BTreeMap::new();
            for round in 0..64 {
                for d in queue.deliver_ready(round, &mut rng).delivered {
                    seen.entry(d.channel()).or_default().extend(marker(&d));
                }
            }
            proptest::prop_assert!(queue.is_empty());
            let total: usize = seen.values().map(Vec::len).sum();
            proptest::prop_assert_eq!(total, channels.len());
            for markers in seen.values() {
                proptest::prop_assert!(markers.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }
}
