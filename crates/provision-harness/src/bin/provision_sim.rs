//! Provisioning simulation binary.
//!
//! Plays one registration against the simulated provisioning service and
//! prints what the device observed. Everything runs in turmoil's virtual
//! time, so a run with minutes of polling finishes instantly and the same
//! seed always produces the same output.
//!
//! # Usage
//!
//! ```bash
//! # Three assigning rounds at 500ms, then assigned
//! provision-sim --assigning-rounds 3 --polling-interval-ms 500
//!
//! # Service reports failure; cancel if it takes longer than 2s
//! provision-sim --final-status failed --cancel-after-ms 2000
//! ```

use std::time::Duration;

use clap::Parser;
use provision_harness::{FinalStatus, RunOptions, Scenario};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Provisioning registration simulator
#[derive(Parser, Debug)]
#[command(name = "provision-sim")]
#[command(about = "Simulate a device registration against a scripted provisioning service")]
#[command(version)]
struct Args {
    /// Simulation RNG seed
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Number of `assigning` answers before the final status
    #[arg(long, default_value = "2")]
    assigning_rounds: u32,

    /// Polling interval the service advertises (omit to use the client
    /// default)
    #[arg(long)]
    polling_interval_ms: Option<u64>,

    /// Status the service settles on
    #[arg(long, value_enum, default_value_t = FinalStatus::Assigned)]
    final_status: FinalStatus,

    /// One-way network latency
    #[arg(long, default_value = "10")]
    latency_ms: u64,

    /// Call `end_session` this long after `register`
    #[arg(long)]
    cancel_after_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let scenario = Scenario::new()
        .with_assigning_rounds(args.assigning_rounds)
        .with_polling_interval(args.polling_interval_ms.map(Duration::from_millis))
        .with_final_status(args.final_status);

    let options = RunOptions {
        seed: args.seed,
        latency: Duration::from_millis(args.latency_ms),
        cancel_after: args.cancel_after_ms.map(Duration::from_millis),
        ..RunOptions::default()
    };

    tracing::info!(?scenario, seed = options.seed, "starting simulation");

    let report = scenario.run(&options)?;

    for (i, status) in report.notifications.iter().enumerate() {
        tracing::info!(round = i + 1, status = status.as_deref().unwrap_or("<none>"), "operationStatus");
    }

    match &report.outcome {
        Ok(body) => tracing::info!(
            elapsed = ?report.elapsed,
            assigned_hub = ?body.registration_state.as_ref().and_then(|s| s.assigned_hub.as_deref()),
            "registered"
        ),
        Err(err) => tracing::warn!(elapsed = ?report.elapsed, %err, "registration failed"),
    }

    if let Err(err) = &report.end_session {
        tracing::warn!(%err, "end session failed");
    }

    tracing::info!(
        registrations = report.service.registrations,
        queries = report.service.queries,
        connections = report.service.connections,
        "service stats"
    );

    Ok(())
}
