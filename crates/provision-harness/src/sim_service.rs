//! Simulated provisioning service.
//!
//! A turmoil host that speaks a small request/response protocol over TCP:
//! each message is a big-endian `u32` length followed by a CBOR document.
//! The service answers a registration with `assigning` for a configurable
//! number of rounds, then with the scenario's final status.

use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use bytes::{BufMut, BytesMut};
use provision_proto::{DeviceRegistrationState, RegistrationBody, cbor};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use turmoil::net::{TcpListener, TcpStream};

use crate::scenario::{FinalStatus, Scenario};

/// Port the service listens on.
pub const SERVICE_PORT: u16 = 5683;

/// Largest frame either side accepts.
pub const MAX_FRAME_SIZE: u32 = 64 * 1024;

/// Request sent by [`SimTransport`](crate::SimTransport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimRequest {
    /// Start a registration.
    Register {
        /// Device registration id.
        registration_id: String,
        /// Re-register even if already assigned.
        force_registration: bool,
    },
    /// Query an assignment operation.
    QueryStatus {
        /// Operation to query.
        operation_id: String,
    },
}

/// Response sent by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimResponse {
    /// HTTP-style status code.
    pub status_code: u16,
    /// Response body, absent on service errors.
    pub body: Option<RegistrationBody>,
    /// Suggested delay before the next status query.
    pub retry_after_ms: Option<u64>,
    /// Service error message.
    pub error: Option<String>,
}

/// Request counters, shared by every clone of the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    /// Registration requests served.
    pub registrations: usize,
    /// Status queries served.
    pub queries: usize,
    /// Connections accepted.
    pub connections: usize,
}

#[derive(Debug, Default)]
struct ServiceState {
    /// Operation id to remaining `assigning` answers and registration id.
    operations: HashMap<String, (u32, String)>,
    next_operation: u64,
    stats: ServiceStats,
}

/// Scripted provisioning service.
#[derive(Debug, Clone)]
pub struct SimProvisioningService {
    scenario: Scenario,
    state: Arc<Mutex<ServiceState>>,
}

impl SimProvisioningService {
    /// Create a service that plays `scenario`.
    pub fn new(scenario: Scenario) -> Self {
        Self { scenario, state: Arc::new(Mutex::new(ServiceState::default())) }
    }

    fn state(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Requests served so far.
    pub fn stats(&self) -> ServiceStats {
        self.state().stats
    }

    /// Accept connections until the simulation ends.
    pub async fn serve(self) -> turmoil::Result {
        let listener =
            TcpListener::bind((IpAddr::from(Ipv4Addr::UNSPECIFIED), SERVICE_PORT)).await?;
        tracing::info!(port = SERVICE_PORT, "provisioning service listening");

        loop {
            let (stream, peer) = listener.accept().await?;
            self.state().stats.connections += 1;
            tracing::debug!(%peer, "connection accepted");

            let service = self.clone();
            tokio::spawn(async move {
                if let Err(err) = service.handle_connection(stream).await {
                    tracing::debug!(%peer, %err, "connection closed");
                }
            });
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> std::io::Result<()> {
        loop {
            let Some(frame) = read_frame(&mut stream).await? else {
                return Ok(());
            };

            let response = match cbor::decode::<SimRequest>(&frame) {
                Ok(request) => self.answer(request),
                Err(err) => SimResponse {
                    status_code: 400,
                    body: None,
                    retry_after_ms: None,
                    error: Some(err.to_string()),
                },
            };

            let payload = cbor::encode(&response).map_err(std::io::Error::other)?;
            write_frame(&mut stream, &payload).await?;
        }
    }

    /// Produce the answer for one request.
    pub fn answer(&self, request: SimRequest) -> SimResponse {
        let mut state = self.state();

        match request {
            SimRequest::Register { registration_id, force_registration } => {
                state.stats.registrations += 1;
                state.next_operation += 1;
                let operation_id = format!("op-{}", state.next_operation);
                tracing::debug!(%registration_id, %operation_id, force_registration, "registration");

                self.progress(&mut state, operation_id, self.scenario.assigning_rounds, registration_id)
            },
            SimRequest::QueryStatus { operation_id } => {
                state.stats.queries += 1;

                match state.operations.remove(&operation_id) {
                    Some((remaining, registration_id)) => {
                        let remaining = remaining.saturating_sub(1);
                        self.progress(&mut state, operation_id, remaining, registration_id)
                    },
                    None => SimResponse {
                        status_code: 404,
                        body: None,
                        retry_after_ms: None,
                        error: Some(format!("unknown operation {operation_id}")),
                    },
                }
            },
        }
    }

    fn progress(
        &self,
        state: &mut ServiceState,
        operation_id: String,
        remaining: u32,
        registration_id: String,
    ) -> SimResponse {
        if remaining > 0 {
            state.operations.insert(operation_id.clone(), (remaining, registration_id));

            return SimResponse {
                status_code: 202,
                body: Some(RegistrationBody::with_status("assigning").operation_id(operation_id)),
                retry_after_ms: self.scenario.polling_interval.map(duration_millis),
                error: None,
            };
        }

        let (status, registration_state) = match self.scenario.final_status {
            FinalStatus::Assigned => (
                "assigned",
                DeviceRegistrationState {
                    assigned_hub: Some("hub-1.sim.local".to_string()),
                    device_id: Some(registration_id.clone()),
                    status: Some("assigned".to_string()),
                    substatus: Some("initialAssignment".to_string()),
                    registration_id,
                    ..DeviceRegistrationState::default()
                },
            ),
            FinalStatus::Failed => (
                "failed",
                DeviceRegistrationState {
                    status: Some("failed".to_string()),
                    error_code: Some(400_207),
                    error_message: Some("custom allocation failed".to_string()),
                    registration_id,
                    ..DeviceRegistrationState::default()
                },
            ),
            FinalStatus::Unrecognized => (
                "disabled",
                DeviceRegistrationState { registration_id, ..DeviceRegistrationState::default() },
            ),
        };

        SimResponse {
            status_code: 200,
            body: Some(
                RegistrationBody::with_status(status)
                    .operation_id(operation_id)
                    .registration_state(registration_state),
            ),
            retry_after_ms: None,
            error: None,
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Read one length-prefixed frame. Returns `None` on a clean close.
pub(crate) async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> std::io::Result<Option<Vec<u8>>> {
    let len = match reader.read_u32().await {
        Ok(len) => len,
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    };

    if len > MAX_FRAME_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds {MAX_FRAME_SIZE}"),
        ));
    }

    let mut frame = vec![0u8; len as usize];
    reader.read_exact(&mut frame).await?;
    Ok(Some(frame))
}

/// Write one length-prefixed frame.
pub(crate) async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> std::io::Result<()> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_SIZE)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "frame too large"))?;

    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(len);
    buf.put_slice(payload);

    writer.write_all(&buf).await?;
    writer.flush().await
}
