//! Provisioning Core
//!
//! Client-side state machine for the poll-until-complete registration
//! protocol. A caller submits a registration request; the provisioning
//! service either answers immediately or reports that assignment is in
//! progress, and the client polls a status endpoint at the service-specified
//! interval until a terminal status arrives.
//!
//! # Architecture
//!
//! The machine is a pure state machine that:
//! - Receives events (caller calls, transport completions, timer firings)
//! - Produces actions for the driver to execute (send request, query status,
//!   start/cancel the poll timer, end the session, notify, resolve a call)
//! - Never performs I/O, so every race can be replayed deterministically
//!
//! The async driver lives in `provision-client`; this crate also defines the
//! [`env::Environment`] abstraction that driver uses for time.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
pub mod error;
pub mod registration;

pub use error::RegistrationError;
pub use registration::{
    CallId, CallOutcome, OperationToken, RegistrationAction, RegistrationConfig,
    RegistrationEvent, RegistrationMachine, RegistrationOutcome, RegistrationState, TimerId,
};
