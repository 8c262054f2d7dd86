//! Registration events and actions.

use std::{fmt, time::Duration};

use provision_proto::{
    ProtocolResult, RegistrationBody, RegistrationRequest, RequestBody, ResponseEnvelope,
    TransportError,
};

use crate::error::RegistrationError;

/// Identity of one caller invocation (`register` or `end_session`).
///
/// Minted by whoever drives the machine; the machine only compares and
/// echoes it back in [`RegistrationAction::Resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call#{}", self.0)
    }
}

/// Identity of one logical registration attempt.
///
/// Minted by the machine each time it enters `SendingRegistrationRequest`
/// and never reused. Every transport completion must echo the token it was
/// issued under; a mismatch marks the completion as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationToken(u64);

impl OperationToken {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Rebuild a token from its raw value, e.g. when replaying a recorded
    /// trace. Tokens for live attempts only come from the machine.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw token value (for logging).
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Identity of one poll delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Rebuild a timer id from its raw value.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw timer value (for logging).
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Successful result of a registration attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationOutcome {
    /// Final response body (status `assigned`).
    pub body: RegistrationBody,
    /// Protocol result of the final response.
    pub result: Option<ProtocolResult>,
}

/// How a pending call is resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// Registration completed; the machine is now `Idle`.
    Registered(RegistrationOutcome),
    /// Session ended cleanly; the machine is now `Disconnected`.
    Disconnected,
    /// The call failed.
    Failed(RegistrationError),
}

impl CallOutcome {
    /// Returns the error, if the call failed.
    pub fn error(&self) -> Option<&RegistrationError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Inputs to the registration machine.
#[derive(Debug, Clone)]
pub enum RegistrationEvent {
    /// Caller asks to register.
    Register {
        /// Caller's pending call.
        call: CallId,
        /// Registration parameters.
        request: RegistrationRequest,
        /// Initial request body.
        body: RequestBody,
    },

    /// Caller asks to end the session, cancelling any attempt.
    EndSession {
        /// Caller's pending call.
        call: CallId,
    },

    /// Transport completed a registration request.
    RegistrationResponse {
        /// Token the request was issued under.
        token: OperationToken,
        /// Transport completion.
        envelope: ResponseEnvelope,
    },

    /// Transport completed a status query.
    OperationStatusResponse {
        /// Token the query was issued under.
        token: OperationToken,
        /// Transport completion.
        envelope: ResponseEnvelope,
    },

    /// A poll delay elapsed.
    PollTimerElapsed {
        /// Timer that fired.
        timer: TimerId,
    },

    /// Transport completed its end-session call.
    SessionEnded {
        /// Teardown failure, if any.
        error: Option<TransportError>,
    },
}

impl RegistrationEvent {
    /// Returns true for events that originate from a caller.
    pub fn is_caller_event(&self) -> bool {
        matches!(self, Self::Register { .. } | Self::EndSession { .. })
    }
}

/// Effects requested by the registration machine.
///
/// The driver executes these in order. Completions are fed back as
/// [`RegistrationEvent`]s carrying the same token or timer id.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationAction {
    /// Submit the registration request.
    SendRegistrationRequest {
        /// Token to tag the completion with.
        token: OperationToken,
        /// Registration parameters.
        request: RegistrationRequest,
        /// Request body.
        body: RequestBody,
    },

    /// Query the status of an in-progress operation.
    QueryOperationStatus {
        /// Token to tag the completion with.
        token: OperationToken,
        /// Registration parameters.
        request: RegistrationRequest,
        /// Operation to query.
        operation_id: String,
    },

    /// Start a one-shot poll delay.
    StartPollTimer {
        /// Timer to report on elapse.
        timer: TimerId,
        /// Delay length.
        delay: Duration,
    },

    /// Cancel a pending poll delay. It must not be reported afterwards.
    CancelPollTimer {
        /// Timer to cancel.
        timer: TimerId,
    },

    /// Tear down the transport session.
    EndTransportSession,

    /// Publish an `operationStatus` notification.
    NotifyStatus(RegistrationBody),

    /// Resolve a caller's pending call.
    Resolve {
        /// Call to resolve.
        call: CallId,
        /// Resolution.
        outcome: CallOutcome,
    },
}
