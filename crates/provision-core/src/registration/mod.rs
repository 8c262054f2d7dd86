//! Poll-until-complete registration protocol.
//!
//! # Components
//!
//! - [`RegistrationMachine`]: the sans-IO state machine
//! - [`RegistrationEvent`]: inputs (caller calls, transport completions,
//!   timer firings)
//! - [`RegistrationAction`]: effects for the driver to execute
//! - [`OperationToken`]: identity of one attempt, used to discard stale
//!   completions

mod event;
mod machine;
mod state;

pub use event::{
    CallId, CallOutcome, OperationToken, RegistrationAction, RegistrationEvent,
    RegistrationOutcome, TimerId,
};
pub use machine::{DEFAULT_POLLING_INTERVAL, RegistrationConfig, RegistrationMachine};
pub use state::RegistrationState;
