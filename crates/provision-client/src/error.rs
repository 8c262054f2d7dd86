//! Client error types.

use provision_core::RegistrationError;
use thiserror::Error;

/// Errors returned by [`RegistrationClient`](crate::RegistrationClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The registration machine resolved the call with an error.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// The driver task is gone; the call was never resolved.
    #[error("registration driver stopped")]
    DriverStopped,
}

impl ClientError {
    /// The registration error, if the machine produced one.
    pub fn registration(&self) -> Option<&RegistrationError> {
        match self {
            Self::Registration(err) => Some(err),
            Self::DriverStopped => None,
        }
    }

    /// Returns true if the call was cancelled by `end_session`.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Registration(RegistrationError::OperationCancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_detected() {
        let err = ClientError::from(RegistrationError::OperationCancelled);
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "operation cancelled");
    }

    #[test]
    fn driver_stopped_has_no_registration_error() {
        let err = ClientError::DriverStopped;
        assert!(err.registration().is_none());
        assert!(!err.is_cancelled());
    }
}
