//! Protocol error types.

use thiserror::Error;

/// Broad category of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection could not be established or was lost.
    Network,
    /// The transport gave up waiting for the service.
    Timeout,
    /// The service rejected the device's credentials.
    Unauthorized,
    /// The service asked the client to slow down.
    Throttled,
    /// The service answered with an error of its own.
    Service,
    /// Anything else.
    Other,
}

/// Error reported by a transport completion.
///
/// Passed through the state machine verbatim, so it is `Clone` and carries
/// only owned data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?} transport error: {message}")]
pub struct TransportError {
    /// Failure category.
    pub kind: TransportErrorKind,
    /// Human-readable description.
    pub message: String,
}

impl TransportError {
    /// Create a transport error.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Network failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    /// Returns true if a later attempt could reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::Network | TransportErrorKind::Timeout | TransportErrorKind::Throttled
        )
    }
}

/// CBOR encoding or decoding failure.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Value could not be encoded.
    #[error("CBOR encode failed: {0}")]
    Encode(String),

    /// Bytes could not be decoded.
    #[error("CBOR decode failed: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_retryable() {
        assert!(TransportError::network("reset").is_retryable());
        assert!(TransportError::new(TransportErrorKind::Throttled, "429").is_retryable());
    }

    #[test]
    fn auth_errors_are_not_retryable() {
        assert!(!TransportError::new(TransportErrorKind::Unauthorized, "401").is_retryable());
        assert!(!TransportError::new(TransportErrorKind::Service, "500").is_retryable());
    }

    #[test]
    fn error_display() {
        let err = TransportError::new(TransportErrorKind::Timeout, "no answer");
        assert_eq!(err.to_string(), "Timeout transport error: no answer");
    }
}
