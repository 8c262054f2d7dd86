//! Deterministic simulation harness for the provisioning registration
//! client.
//!
//! Turmoil-based implementations of the `Environment` and `Transport` traits
//! for deterministic, reproducible testing of the full register/poll cycle
//! under simulated network conditions, plus an in-memory scripted transport
//! for driver tests that need to hold a call in flight.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation for model-based
//! testing. Operations are applied to both the model and the real
//! registration machine, and their observable states are compared.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model;
pub mod scenario;
pub mod scripted;
pub mod sim_env;
pub mod sim_service;
pub mod sim_transport;

pub use model::{ModelMachine, ModelReply, ObservableState, Operation, Resolution};
pub use scenario::{FinalStatus, RunOptions, SERVICE_HOST, Scenario, SimReport};
pub use scripted::{ScriptedTransport, TransportCall};
pub use sim_env::SimEnv;
pub use sim_service::{ServiceStats, SimProvisioningService, SimRequest, SimResponse};
pub use sim_transport::SimTransport;
