//! Registration error types.

use provision_proto::{ProtocolResult, RegistrationBody, TransportError};
use thiserror::Error;

/// Errors surfaced to callers of the registration machine.
///
/// Every attempt-terminating variant is delivered through the disconnect
/// sequence, so the caller sees exactly one of these per failed attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    /// `register` was issued while another attempt is in flight.
    #[error("invalid operation: {reason}")]
    InvalidOperation {
        /// Why the call was rejected.
        reason: String,
    },

    /// The service completed the operation with status `failed`.
    #[error("device registration failed")]
    DeviceRegistrationFailed {
        /// Body that carried the failure.
        body: Box<RegistrationBody>,
        /// Protocol result of the failing response.
        result: Option<ProtocolResult>,
    },

    /// The response carried a missing or unsupported status, or lacked a
    /// field the status requires.
    #[error("protocol format error: {reason}")]
    ProtocolFormat {
        /// What was wrong with the response.
        reason: String,
        /// Offending body, if one was returned.
        body: Option<Box<RegistrationBody>>,
        /// Protocol result of the offending response.
        result: Option<ProtocolResult>,
    },

    /// A registration request or status query failed in the transport.
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// The attempt was cancelled by `end_session`.
    #[error("operation cancelled")]
    OperationCancelled,

    /// The transport's end-session call failed.
    #[error("disconnect error: {0}")]
    Disconnect(TransportError),
}

impl RegistrationError {
    /// Error for a `register` call rejected because an attempt is active.
    pub fn operation_in_progress() -> Self {
        Self::InvalidOperation { reason: "another operation is in progress".to_string() }
    }

    /// Returns true if this error is fatal for the attempt that produced it.
    ///
    /// Non-fatal errors leave the machine untouched (a rejected concurrent
    /// call) or come from an explicit caller action.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::DeviceRegistrationFailed { .. }
            | Self::ProtocolFormat { .. }
            | Self::Transport(_)
            | Self::Disconnect(_) => true,

            Self::InvalidOperation { .. } | Self::OperationCancelled => false,
        }
    }

    /// Response body carried by the error, if any.
    pub fn body(&self) -> Option<&RegistrationBody> {
        match self {
            Self::DeviceRegistrationFailed { body, .. } => Some(&**body),
            Self::ProtocolFormat { body, .. } => body.as_deref(),
            _ => None,
        }
    }

    /// Protocol result carried by the error, if any.
    pub fn protocol_result(&self) -> Option<&ProtocolResult> {
        match self {
            Self::DeviceRegistrationFailed { result, .. } | Self::ProtocolFormat { result, .. } => {
                result.as_ref()
            },
            _ => None,
        }
    }
}
