//! End-to-end registration scenarios under turmoil.
//!
//! A scenario fixes how the simulated service behaves (how many `assigning`
//! rounds, which polling interval it advertises, which final status it
//! reports). [`Scenario::run`] plays it against a real
//! [`RegistrationClient`] over a simulated network and reports what the
//! caller observed.
//!
//! # Example
//!
//! ```rust,ignore
//! let report = Scenario::new()
//!     .with_assigning_rounds(3)
//!     .run(&RunOptions::default())?;
//! assert!(report.outcome.is_ok());
//! ```

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use provision_client::{ClientConfig, RegistrationClient};
use provision_core::{RegistrationState, env::Environment};
use provision_proto::{RegistrationBody, RegistrationRequest, RequestBody};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    sim_env::SimEnv,
    sim_service::{ServiceStats, SimProvisioningService},
    sim_transport::SimTransport,
};

/// Turmoil host name of the simulated service.
pub const SERVICE_HOST: &str = "service";

/// Status the service settles on after its `assigning` rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FinalStatus {
    /// `assigned`: registration succeeds.
    #[default]
    Assigned,
    /// `failed`: the service rejects the device.
    Failed,
    /// A status the protocol does not define.
    Unrecognized,
}

/// Behavior of the simulated service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scenario {
    /// `assigning` answers before the final status.
    pub assigning_rounds: u32,
    /// Polling interval advertised with each `assigning` answer. `None`
    /// leaves the client on its default.
    pub polling_interval: Option<Duration>,
    /// Final status.
    pub final_status: FinalStatus,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario {
    /// Two `assigning` rounds at 1s, then `assigned`.
    pub fn new() -> Self {
        Self {
            assigning_rounds: 2,
            polling_interval: Some(Duration::from_secs(1)),
            final_status: FinalStatus::Assigned,
        }
    }

    /// Scenario drawn from `seed`.
    pub fn random(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let assigning_rounds = rng.gen_range(0..6);
        let polling_interval =
            rng.gen_bool(0.8).then(|| Duration::from_millis(rng.gen_range(100..3_000)));
        let final_status = match rng.gen_range(0..10) {
            0..=6 => FinalStatus::Assigned,
            7 | 8 => FinalStatus::Failed,
            _ => FinalStatus::Unrecognized,
        };

        Self { assigning_rounds, polling_interval, final_status }
    }

    /// Set the number of `assigning` rounds.
    #[must_use]
    pub fn with_assigning_rounds(mut self, rounds: u32) -> Self {
        self.assigning_rounds = rounds;
        self
    }

    /// Set the advertised polling interval.
    #[must_use]
    pub fn with_polling_interval(mut self, interval: Option<Duration>) -> Self {
        self.polling_interval = interval;
        self
    }

    /// Set the final status.
    #[must_use]
    pub fn with_final_status(mut self, status: FinalStatus) -> Self {
        self.final_status = status;
        self
    }

    /// Play the scenario in a fresh simulation.
    pub fn run(&self, options: &RunOptions) -> turmoil::Result<SimReport> {
        let mut sim = turmoil::Builder::new()
            .simulation_duration(options.simulation_duration)
            .min_message_latency(options.latency)
            .max_message_latency(options.latency)
            .rng_seed(options.seed)
            .build();

        let service = SimProvisioningService::new(*self);
        let host_service = service.clone();
        sim.host(SERVICE_HOST, move || host_service.clone().serve());

        let report = Arc::new(Mutex::new(None));
        let captured = Arc::clone(&report);
        let cancel_after = options.cancel_after;
        let client_config = options.client;

        sim.client("device", async move {
            let observed = register_once(client_config, cancel_after).await?;
            *captured.lock().map_err(|_| "report lock poisoned")? = Some(observed);
            Ok(())
        });

        sim.run()?;

        let observed = report
            .lock()
            .map_err(|_| "report lock poisoned")?
            .take()
            .ok_or("client finished without a report")?;

        Ok(SimReport { service: service.stats(), ..observed })
    }
}

/// How a scenario is run.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Turmoil RNG seed.
    pub seed: u64,
    /// One-way network latency.
    pub latency: Duration,
    /// Call `end_session` this long after `register`.
    pub cancel_after: Option<Duration>,
    /// Client configuration.
    pub client: ClientConfig,
    /// Simulated time budget.
    pub simulation_duration: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            seed: 0,
            latency: Duration::from_millis(10),
            cancel_after: None,
            client: ClientConfig::default(),
            simulation_duration: Duration::from_secs(600),
        }
    }
}

/// What the caller observed.
#[derive(Debug, Clone, PartialEq)]
pub struct SimReport {
    /// Final body on success, error text on failure.
    pub outcome: Result<RegistrationBody, String>,
    /// Result of the `end_session` call.
    pub end_session: Result<(), String>,
    /// Statuses of the `operationStatus` notifications, in order.
    pub notifications: Vec<Option<String>>,
    /// Client state after `register` resolved.
    pub state_after_register: RegistrationState,
    /// Simulated time from `register` to its resolution.
    pub elapsed: Duration,
    /// Service-side counters.
    pub service: ServiceStats,
}

async fn register_once(
    config: ClientConfig,
    cancel_after: Option<Duration>,
) -> turmoil::Result<SimReport> {
    let env = SimEnv::new();
    let client = RegistrationClient::spawn(SimTransport::new(SERVICE_HOST), env, config);
    let mut notifications = client.subscribe();

    let request = RegistrationRequest::new("sim-device", "0ne00000000");
    let body = RequestBody::new("sim-device");
    let start = env.now();

    let (outcome, cancelled) = match cancel_after {
        Some(after) => {
            let cancel = async {
                env.sleep(after).await;
                client.end_session().await
            };
            let (outcome, cancelled) = tokio::join!(client.register(request, body), cancel);
            (outcome, Some(cancelled))
        },
        None => (client.register(request, body).await, None),
    };
    let elapsed = env.elapsed_since(start);
    let state_after_register = client.state();

    let end_session = match cancelled {
        Some(result) => result,
        None => client.end_session().await,
    };

    let mut statuses = Vec::new();
    while let Ok(notification) = notifications.try_recv() {
        statuses.push(notification.body.status);
    }

    client.shutdown().await?;

    tracing::info!(?elapsed, notifications = statuses.len(), "scenario finished");

    Ok(SimReport {
        outcome: outcome.map(|o| o.body).map_err(|err| err.to_string()),
        end_session: end_session.map_err(|err| err.to_string()),
        notifications: statuses,
        state_after_register,
        elapsed,
        service: ServiceStats::default(),
    })
}
