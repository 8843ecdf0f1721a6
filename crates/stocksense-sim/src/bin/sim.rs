#![forbid(unsafe_code)]

use std::env;

use anyhow::{Result, bail};
use clap::Parser;
use stocksense_core::config::resolve_config;
use stocksense_sim::campaign::{CampaignConfig, format_violation, replay_seed, run_campaign};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "stocksense-sim: deterministic simulation campaigns for the inventory view-model",
    long_about = None
)]
struct Cli {
    /// First seed to run.
    #[arg(long, default_value_t = 0)]
    seed_start: u64,

    /// Number of seeds to run.
    #[arg(long, default_value_t = 100)]
    seeds: u64,

    /// Replay a single seed and print its trace instead of running a campaign.
    #[arg(long, conflicts_with_all = ["seed_start", "seeds"])]
    replay: Option<u64>,

    /// User actions per seed.
    #[arg(long, default_value_t = 64)]
    rounds: u64,

    /// Items seeded per owner.
    #[arg(long, default_value_t = 4)]
    items: usize,

    /// Maximum delivery delay in rounds.
    #[arg(long, default_value_t = 2)]
    max_delay: u8,

    /// Cross-channel reorder rate (percent).
    #[arg(long, default_value_t = 10)]
    reorder: u8,

    /// Backend batch rejection rate (percent).
    #[arg(long, default_value_t = 10)]
    reject: u8,

    /// Feed error rate (percent).
    #[arg(long, default_value_t = 3)]
    feed_error: u8,

    /// Submit refusal rate (percent).
    #[arg(long, default_value_t = 3)]
    submit_failure: u8,

    /// Subscribe refusal rate (percent).
    #[arg(long, default_value_t = 3)]
    subscribe_failure: u8,

    /// Emit JSON output instead of human-readable text.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn campaign(&self) -> Result<CampaignConfig> {
        let settings = resolve_config(&env::current_dir()?)?;
        debug!(?settings, "resolved view-model settings");
        Ok(CampaignConfig {
            seed_range: self.seed_start..self.seed_start.saturating_add(self.seeds),
            rounds: self.rounds,
            items_per_owner: self.items,
            fault_max_delay: self.max_delay,
            fault_reorder_percent: self.reorder,
            fault_reject_percent: self.reject,
            fault_feed_error_percent: self.feed_error,
            fault_submit_failure_percent: self.submit_failure,
            fault_subscribe_failure_percent: self.subscribe_failure,
            settings,
        })
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("STOCKSENSE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "stocksense=debug,info"
        } else {
            "stocksense=info,warn"
        })
    });

    let format = env::var("STOCKSENSE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.campaign()?;

    if let Some(seed) = cli.replay {
        let result = replay_seed(seed, &config)?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            for event in &result.trace {
                println!("[{:>4}] {:?}", event.round, event.kind);
            }
            for violation in &result.oracle.violations {
                println!("VIOLATION {}", format_violation(violation));
            }
            println!(
                "seed {seed}: passed={} actions={} commits={} failed_batches={} stale={}",
                result.oracle.passed,
                result.stats.actions,
                result.stats.commits,
                result.stats.failed_batches,
                result.stats.stale_deliveries,
            );
        }
        if !result.oracle.passed {
            bail!("seed {seed} violated {} invariant(s)", result.oracle.violations.len());
        }
        return Ok(());
    }

    info!(seeds = cli.seeds, rounds = cli.rounds, "starting campaign");
    let report = run_campaign(&config)?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "campaign complete: seeds_run={} passed={} interesting={}",
            report.seeds_run, report.seeds_passed, report.interesting_states_reached
        );
        for failure in &report.failures {
            println!("seed {} failed:", failure.seed);
            for violation in &failure.violations {
                println!("  {violation}");
            }
        }
    }
    if let Some(seed) = report.first_failure {
        bail!("campaign failed; replay with --replay {seed}");
    }
    Ok(())
}
