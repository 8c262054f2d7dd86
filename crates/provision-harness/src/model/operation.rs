//! Operations for model-based testing.
//!
//! Operations represent every input the registration machine can see: caller
//! calls, transport completions (current and stale), timer elapses and the
//! end of a session. They are generated randomly by proptest and applied to
//! both the model and the real machine.

use std::time::Duration;

use arbitrary::Arbitrary;
use provision_core::{CallOutcome, RegistrationError};
use provision_proto::{
    ProtocolResult, RegistrationBody, ResponseEnvelope, TransportError, TransportErrorKind,
};

/// Operations that can be applied to the system.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Caller calls `register`.
    Register,

    /// Caller calls `end_session`.
    EndSession,

    /// The outstanding transport call completes.
    ///
    /// Delivered with the token of the most recently issued transport call,
    /// which may no longer be live.
    Respond {
        /// Completion to deliver.
        reply: ModelReply,
    },

    /// A completion tagged with a token that was never live arrives.
    RespondStale {
        /// Completion to deliver.
        reply: ModelReply,
    },

    /// The most recently started poll timer elapses.
    FireTimer,

    /// A poll timer that was never started elapses.
    FireStaleTimer,

    /// The transport finishes ending the session.
    SessionEnded {
        /// Whether the end-session call failed.
        fails: bool,
    },
}

/// Shape of a transport completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum ModelReply {
    /// Status `assigned`.
    Assigned,
    /// Status `assigning` with an operation id.
    Assigning {
        /// Whether the response carries a polling interval.
        with_interval: bool,
    },
    /// Status `assigning` without an operation id.
    AssigningWithoutOperationId,
    /// Status `failed`.
    Failed,
    /// A status the protocol does not define.
    Unrecognized,
    /// A body with no status.
    MissingStatus,
    /// No body at all.
    MissingBody,
    /// Transport-level failure.
    TransportFailure,
}

impl ModelReply {
    /// Expand to the envelope a transport would produce.
    pub fn to_envelope(self) -> ResponseEnvelope {
        let ok = |body: RegistrationBody| {
            ResponseEnvelope::ok(body).with_result(ProtocolResult::status(200))
        };

        match self {
            Self::Assigned => ok(RegistrationBody::with_status("assigned").operation_id("op")),
            Self::Assigning { with_interval } => {
                let envelope = ok(RegistrationBody::with_status("assigning").operation_id("op"));
                if with_interval {
                    envelope.with_polling_interval(Duration::from_millis(250))
                } else {
                    envelope
                }
            },
            Self::AssigningWithoutOperationId => ok(RegistrationBody::with_status("assigning")),
            Self::Failed => ok(RegistrationBody::with_status("failed").operation_id("op")),
            Self::Unrecognized => ok(RegistrationBody::with_status("pending").operation_id("op")),
            Self::MissingStatus => ok(RegistrationBody::default().operation_id("op")),
            Self::MissingBody => ResponseEnvelope::default(),
            Self::TransportFailure => ResponseEnvelope::failed(TransportError::new(
                TransportErrorKind::Timeout,
                "no answer",
            )),
        }
    }
}

/// How a caller call was resolved, reduced to what the model predicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// `register` succeeded.
    Registered,
    /// `end_session` succeeded.
    Disconnected,
    /// Rejected: another attempt was in flight.
    InvalidOperation,
    /// Service reported `failed`.
    DeviceRegistrationFailed,
    /// Response could not be interpreted.
    ProtocolFormat,
    /// Transport call failed.
    Transport,
    /// Attempt cancelled by `end_session`.
    OperationCancelled,
    /// Session teardown failed.
    Disconnect,
}

impl From<&CallOutcome> for Resolution {
    fn from(outcome: &CallOutcome) -> Self {
        match outcome {
            CallOutcome::Registered(_) => Self::Registered,
            CallOutcome::Disconnected => Self::Disconnected,
            CallOutcome::Failed(err) => match err {
                RegistrationError::InvalidOperation { .. } => Self::InvalidOperation,
                RegistrationError::DeviceRegistrationFailed { .. } => {
                    Self::DeviceRegistrationFailed
                },
                RegistrationError::ProtocolFormat { .. } => Self::ProtocolFormat,
                RegistrationError::Transport(_) => Self::Transport,
                RegistrationError::OperationCancelled => Self::OperationCancelled,
                RegistrationError::Disconnect(_) => Self::Disconnect,
            },
        }
    }
}
