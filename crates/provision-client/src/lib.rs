//! Provisioning Client
//!
//! Async runtime for the registration state machine. Owns one
//! [`RegistrationMachine`](provision_core::RegistrationMachine) per client,
//! executes its actions against a [`Transport`], runs the poll delay on an
//! [`Environment`] clock, and hands results back to callers.
//!
//! # Architecture
//!
//! The client is an actor:
//! - Caller calls become commands on a bounded queue
//! - Transport completions and timer elapses come back on a completion queue
//! - A single driver task feeds both into the machine, one event at a time
//!
//! # Components
//!
//! - [`RegistrationClient`]: caller-facing handle (`register`, `end_session`,
//!   `subscribe`)
//! - [`Transport`]: the pluggable wire layer
//! - [`PollScheduler`]: cancellable poll delays
//! - [`SystemEnv`]: production clock

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod error;
mod scheduler;
mod system_env;
mod transport;

pub use client::{ClientConfig, RegistrationClient, StatusNotification};
pub use error::ClientError;
pub use provision_core::{
    RegistrationConfig, RegistrationError, RegistrationOutcome, RegistrationState,
    env::Environment,
};
pub use provision_proto::{
    RegistrationBody, RegistrationRequest, RequestBody, ResponseEnvelope, TransportError,
};
pub use scheduler::PollScheduler;
pub use system_env::SystemEnv;
pub use transport::Transport;
