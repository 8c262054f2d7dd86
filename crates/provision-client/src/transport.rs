//! Transport abstraction.
//!
//! The wire encoding (HTTP, AMQP, MQTT), connection setup, authentication
//! and per-call retries all live behind this trait. The registration driver
//! only sequences calls and interprets their completions.

use async_trait::async_trait;
use provision_proto::{RegistrationRequest, RequestBody, ResponseEnvelope, TransportError};

/// Provisioning service transport.
///
/// Each method completes exactly once. Failures are reported inside the
/// returned [`ResponseEnvelope`] rather than as a `Result`, because a
/// failed completion may still carry a body or protocol result.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Submit a registration request.
    async fn registration_request(
        &self,
        request: RegistrationRequest,
        body: RequestBody,
    ) -> ResponseEnvelope;

    /// Query the status of an in-progress assignment operation.
    async fn query_operation_status(
        &self,
        request: RegistrationRequest,
        operation_id: String,
    ) -> ResponseEnvelope;

    /// Terminate the session and release transport resources.
    async fn end_session(&self) -> Result<(), TransportError>;
}
