//! Provisioning protocol message model.
//!
//! Wire-agnostic types exchanged between the registration state machine and
//! a transport. The concrete encoding (HTTP, AMQP, MQTT) belongs to the
//! transport; this crate only fixes the shape of requests and responses and
//! the one place where response status strings are interpreted.
//!
//! # Components
//!
//! - [`RegistrationRequest`] / [`RequestBody`]: what the caller submits
//! - [`RegistrationBody`]: the service's answer (status, operation id, state)
//! - [`ResponseEnvelope`]: one transport completion
//! - [`RegistrationStatus`]: the four-way status classification
//! - [`cbor`]: CBOR helpers for transports and simulators that need bytes

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cbor;
mod error;
mod request;
mod response;
mod status;

pub use error::{CodecError, TransportError, TransportErrorKind};
pub use request::{RegistrationRequest, RequestBody};
pub use response::{DeviceRegistrationState, ProtocolResult, RegistrationBody, ResponseEnvelope};
pub use status::RegistrationStatus;
