//! Registration machine states.

use std::fmt;

/// Protocol state of the registration machine.
///
/// `Disconnected` and `Idle` are the resting states a caller observes.
/// `ResponseReceived`, `ResponseComplete` and `ResponseError` are transient:
/// they run to completion inside a single event and are only visible in
/// logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationState {
    /// No session. Initial state.
    Disconnected,
    /// Last attempt succeeded; session still open.
    Idle,
    /// Waiting for the registration request to complete.
    SendingRegistrationRequest,
    /// Classifying a response.
    ResponseReceived,
    /// Attempt succeeded.
    ResponseComplete,
    /// Attempt failed.
    ResponseError,
    /// Waiting out the service-directed polling interval.
    WaitingToPoll,
    /// Waiting for a status query to complete.
    Polling,
    /// Waiting for the transport to end the session.
    EndingSession,
}

impl RegistrationState {
    /// Returns true while a registration attempt is in flight.
    pub fn is_in_progress(self) -> bool {
        matches!(self, Self::SendingRegistrationRequest | Self::WaitingToPoll | Self::Polling)
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Idle => "idle",
            Self::SendingRegistrationRequest => "sendingRegistrationRequest",
            Self::ResponseReceived => "responseReceived",
            Self::ResponseComplete => "responseComplete",
            Self::ResponseError => "responseError",
            Self::WaitingToPoll => "waitingToPoll",
            Self::Polling => "polling",
            Self::EndingSession => "endingSession",
        };
        f.write_str(name)
    }
}
