//! Campaign runner for deterministic simulation campaigns.
//!
//! Executes many seeds with the same fault profile, collecting pass/fail
//! results and identifying the first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use stocksense_core::config::StockSenseConfig;

use crate::delivery::FaultConfig;
use crate::oracle::InvariantViolation;
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Campaign-level configuration controlling how many seeds to run and
/// what simulation parameters to use for each seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g., `0..100`.
    pub seed_range: Range<u64>,
    /// Number of user actions per seed.
    pub rounds: u64,
    /// Items seeded per owner.
    pub items_per_owner: usize,
    /// Maximum delivery delay in rounds.
    pub fault_max_delay: u8,
    /// Cross-channel delivery interleaving (percent, 0–100).
    pub fault_reorder_percent: u8,
    /// Backend rejecting a pending batch (percent, 0–100).
    pub fault_reject_percent: u8,
    /// Feed error pushed to the live subscription (percent, 0–100).
    pub fault_feed_error_percent: u8,
    /// Backend refusing a submit outright (percent, 0–100).
    pub fault_submit_failure_percent: u8,
    /// Feed refusing a subscribe (percent, 0–100).
    pub fault_subscribe_failure_percent: u8,
    /// View-model settings shared by every seed.
    #[serde(default)]
    pub settings: StockSenseConfig,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let fault = FaultConfig::default();
        Self {
            seed_range: 0..100,
            rounds: 64,
            items_per_owner: 4,
            fault_max_delay: fault.max_delay_rounds,
            fault_reorder_percent: fault.reorder_rate_percent,
            fault_reject_percent: fault.reject_rate_percent,
            fault_feed_error_percent: fault.feed_error_rate_percent,
            fault_submit_failure_percent: fault.submit_failure_rate_percent,
            fault_subscribe_failure_percent: fault.subscribe_failure_rate_percent,
            settings: StockSenseConfig::default(),
        }
    }
}

impl CampaignConfig {
    /// Build a [`SimulationConfig`] for a specific seed.
    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            rounds: self.rounds,
            items_per_owner: self.items_per_owner,
            fault: FaultConfig {
                max_delay_rounds: self.fault_max_delay,
                reorder_rate_percent: self.fault_reorder_percent,
                reject_rate_percent: self.fault_reject_percent,
                feed_error_rate_percent: self.fault_feed_error_percent,
                submit_failure_rate_percent: self.fault_submit_failure_percent,
                subscribe_failure_rate_percent: self.fault_subscribe_failure_percent,
            },
            ..SimulationConfig::default()
        }
    }

    /// Validate configuration before running.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        if self.rounds == 0 {
            bail!("rounds must be > 0");
        }
        let percents = [
            ("reorder", self.fault_reorder_percent),
            ("reject", self.fault_reject_percent),
            ("feed error", self.fault_feed_error_percent),
            ("submit failure", self.fault_submit_failure_percent),
            ("subscribe failure", self.fault_subscribe_failure_percent),
        ];
        for (name, percent) in percents {
            if percent > 100 {
                bail!("{name} rate must be 0-100, got {percent}");
            }
        }
        Ok(())
    }
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    /// The seed that failed.
    pub seed: u64,
    /// Invariant violations found.
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    /// Total seeds executed.
    pub seeds_run: usize,
    /// Seeds that passed all invariants.
    pub seeds_passed: usize,
    /// First seed that failed (for prioritized replay).
    pub first_failure: Option<u64>,
    /// All seed failures with violation details.
    pub failures: Vec<SeedFailure>,
    /// Seeds that went through at least one fault path.
    pub interesting_states_reached: usize,
}

impl CampaignReport {
    /// True if every seed passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run a full campaign across all seeds in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a simulation encounters
/// an internal error.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        interesting_states_reached: 0,
    };

    for seed in config.seed_range.clone() {
        report.seeds_run += 1;
        let result = replay_seed(seed, config)?;
        if result.interesting_state_reached {
            report.interesting_states_reached += 1;
        }
        if result.oracle.passed {
            report.seeds_passed += 1;
            continue;
        }
        tracing::warn!(seed, violations = result.oracle.violations.len(), "seed failed");
        if report.first_failure.is_none() {
            report.first_failure = Some(seed);
        }
        report.failures.push(SeedFailure {
            seed,
            violations: result
                .oracle
                .violations
                .iter()
                .map(format_violation)
                .collect(),
        });
    }

    Ok(report)
}

/// Run a single seed and return Ok(()) on pass, Err(violations) on failure.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the simulation itself cannot run. The inner
/// `Result` distinguishes pass from invariant violations.
pub fn run_single_seed(
    seed: u64,
    config: &CampaignConfig,
) -> Result<std::result::Result<(), Vec<InvariantViolation>>> {
    let result = replay_seed(seed, config)?;
    if result.oracle.passed {
        Ok(Ok(()))
    } else {
        Ok(Err(result.oracle.violations))
    }
}

/// Replay a single seed with its full trace for debugging.
///
/// # Errors
///
/// Returns an error when config validation or simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<SimulationResult> {
    config.validate()?;
    let mut simulator =
        Simulator::with_settings(config.sim_config_for_seed(seed), config.settings.clone())?;
    simulator.run()
}

/// Format an invariant violation into a human-readable string.
#[must_use]
pub fn format_violation(v: &InvariantViolation) -> String {
    match v {
        InvariantViolation::ForeignItem {
            round,
            item,
            owner,
            identity,
        } => match identity {
            Some(identity) => format!(
                "ForeignItem: round {round} shows {item} owned by {owner} to {identity}"
            ),
            None => format!("ForeignItem: round {round} shows {item} owned by {owner} while signed out"),
        },
        InvariantViolation::PartitionLeak {
            round,
            item,
            item_archived,
            showing_archived,
        } => format!(
            "PartitionLeak: round {round} shows {item} (archived={item_archived}) \
             in the archived={showing_archived} list"
        ),
        InvariantViolation::SelectionNotVisible { round, item } => {
            format!("SelectionNotVisible: round {round} keeps {item} selected but hidden")
        }
        InvariantViolation::InFlightMismatch {
            round,
            outstanding,
            busy,
        } => format!(
            "InFlightMismatch: round {round} has {outstanding} outstanding request(s) \
             with busy={busy}"
        ),
        InvariantViolation::Divergence {
            key,
            missing,
            extra,
            changed,
        } => format!(
            "Divergence: {key} differs from the store \
             (missing={missing:?}, extra={extra:?}, changed={changed:?})"
        ),
        InvariantViolation::Stuck { loading, busy } => {
            format!("Stuck: nothing left to deliver but loading={loading} busy={busy}")
        }
    }
}
