//! Turmoil-backed transport.
//!
//! Holds one TCP connection to the simulated service for the lifetime of a
//! session. The connection is opened by the first request and closed by
//! `end_session`; an I/O failure drops it so the next request reconnects.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use provision_client::Transport;
use provision_proto::{
    ProtocolResult, RegistrationRequest, RequestBody, ResponseEnvelope, TransportError,
    TransportErrorKind, cbor,
};
use tokio::{io::AsyncWriteExt, sync::Mutex};
use turmoil::net::TcpStream;

use crate::sim_service::{SERVICE_PORT, SimRequest, SimResponse, read_frame, write_frame};

/// Transport talking to a [`SimProvisioningService`](crate::SimProvisioningService).
pub struct SimTransport {
    host: String,
    connection: Mutex<Option<TcpStream>>,
}

impl SimTransport {
    /// Transport for the service running on turmoil host `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into(), connection: Mutex::new(None) }
    }

    async fn exchange(&self, request: SimRequest) -> ResponseEnvelope {
        match self.try_exchange(&request).await {
            Ok(envelope) => envelope,
            Err(err) => ResponseEnvelope::failed(err),
        }
    }

    async fn try_exchange(&self, request: &SimRequest) -> Result<ResponseEnvelope, TransportError> {
        let payload = cbor::encode(request)
            .map_err(|err| TransportError::new(TransportErrorKind::Other, err.to_string()))?;

        let mut connection = self.connection.lock().await;
        let stream = match connection.take() {
            Some(stream) => stream,
            None => {
                tracing::debug!(host = %self.host, "connecting to provisioning service");
                let addr = format!("{}:{SERVICE_PORT}", self.host);
                TcpStream::connect(addr.as_str())
                    .await
                    .map_err(|err| TransportError::network(err.to_string()))?
            },
        };

        // The stream is only put back after a complete exchange.
        let mut stream = stream;
        write_frame(&mut stream, &payload)
            .await
            .map_err(|err| TransportError::network(err.to_string()))?;
        let frame = read_frame(&mut stream)
            .await
            .map_err(|err| TransportError::network(err.to_string()))?
            .ok_or_else(|| TransportError::network("service closed the connection"))?;
        *connection = Some(stream);

        let response: SimResponse = cbor::decode(&frame)
            .map_err(|err| TransportError::new(TransportErrorKind::Other, err.to_string()))?;

        Ok(into_envelope(response, Bytes::from(frame)))
    }
}

fn into_envelope(response: SimResponse, raw: Bytes) -> ResponseEnvelope {
    let result = ProtocolResult { status_code: Some(response.status_code), raw };

    if let Some(message) = response.error {
        let kind = match response.status_code {
            401 | 403 => TransportErrorKind::Unauthorized,
            429 => TransportErrorKind::Throttled,
            _ => TransportErrorKind::Service,
        };
        return ResponseEnvelope {
            error: Some(TransportError::new(kind, message)),
            body: response.body,
            result: Some(result),
            polling_interval: None,
        };
    }

    ResponseEnvelope {
        error: None,
        body: response.body,
        result: Some(result),
        polling_interval: response.retry_after_ms.map(Duration::from_millis),
    }
}

#[async_trait]
impl Transport for SimTransport {
    async fn registration_request(
        &self,
        request: RegistrationRequest,
        body: RequestBody,
    ) -> ResponseEnvelope {
        self.exchange(SimRequest::Register {
            registration_id: body.registration_id,
            force_registration: request.force_registration,
        })
        .await
    }

    async fn query_operation_status(
        &self,
        _request: RegistrationRequest,
        operation_id: String,
    ) -> ResponseEnvelope {
        self.exchange(SimRequest::QueryStatus { operation_id }).await
    }

    async fn end_session(&self) -> Result<(), TransportError> {
        let Some(mut stream) = self.connection.lock().await.take() else {
            return Ok(());
        };

        tracing::debug!(host = %self.host, "closing provisioning session");
        stream.shutdown().await.map_err(|err| TransportError::network(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use provision_proto::RegistrationBody;

    use super::*;

    #[test]
    fn service_error_becomes_transport_error() {
        let response = SimResponse {
            status_code: 429,
            body: None,
            retry_after_ms: Some(500),
            error: Some("slow down".to_string()),
        };

        let envelope = into_envelope(response, Bytes::new());
        let error = envelope.error.as_ref().map(|err| err.kind);

        assert_eq!(error, Some(TransportErrorKind::Throttled));
        assert!(envelope.polling_interval.is_none());
        assert_eq!(envelope.result.and_then(|r| r.status_code), Some(429));
    }

    #[test]
    fn retry_after_becomes_polling_interval() {
        let response = SimResponse {
            status_code: 202,
            body: Some(RegistrationBody::with_status("assigning").operation_id("op-1")),
            retry_after_ms: Some(1500),
            error: None,
        };

        let envelope = into_envelope(response, Bytes::from_static(b"raw"));

        assert!(envelope.error.is_none());
        assert_eq!(envelope.polling_interval, Some(Duration::from_millis(1500)));
        assert_eq!(envelope.result.map(|r| r.raw), Some(Bytes::from_static(b"raw")));
    }
}
