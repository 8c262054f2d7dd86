//! Reference model for model-based testing.
//!
//! The model is a deliberately naive registration machine: a handful of
//! fields and a `match` per operation. It serves as the oracle against which
//! the real [`RegistrationMachine`](provision_core::RegistrationMachine) is
//! verified.
//!
//! # Design Principles
//!
//! - Simplicity: The model should be obviously correct
//! - Observable behavior only: states, resolutions and effect counts
//! - Deterministic: Same operations produce same observable state

mod machine;
pub mod operation;

pub use machine::{ModelMachine, ObservableState};
pub use operation::{ModelReply, Operation, Resolution};
