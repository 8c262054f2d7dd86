//! Response types produced by a transport.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{error::TransportError, status::RegistrationStatus};

/// Response body returned by the provisioning service.
///
/// Both the registration request and every status query answer with this
/// shape. `status` drives the state machine; `operation_id` is what the
/// client polls with while the service is still assigning.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationBody {
    /// Id of the long-running assignment operation.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub operation_id: Option<String>,
    /// Operation status (`assigned`, `assigning`, `failed`, ...).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<String>,
    /// Device registration record, present once the service has one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub registration_state: Option<DeviceRegistrationState>,
}

impl RegistrationBody {
    /// Body with just a status string.
    pub fn with_status(status: impl Into<String>) -> Self {
        Self { status: Some(status.into()), ..Self::default() }
    }

    /// Set the operation id.
    #[must_use]
    pub fn operation_id(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = Some(operation_id.into());
        self
    }

    /// Set the registration state.
    #[must_use]
    pub fn registration_state(mut self, state: DeviceRegistrationState) -> Self {
        self.registration_state = Some(state);
        self
    }

    /// Classify the body's status.
    pub fn classify(&self) -> RegistrationStatus {
        RegistrationStatus::classify(self.status.as_deref())
    }
}

/// Device registration record kept by the provisioning service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRegistrationState {
    /// Registration id of the device.
    pub registration_id: String,
    /// When the registration record was created.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub created_date_time_utc: Option<String>,
    /// Hub the device was assigned to.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub assigned_hub: Option<String>,
    /// Device id on the assigned hub.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub device_id: Option<String>,
    /// Registration status as recorded by the service.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<String>,
    /// Finer-grained assignment outcome (`initialAssignment`,
    /// `deviceDataMigrated`, ...).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub substatus: Option<String>,
    /// Entity tag of the record.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub etag: Option<String>,
    /// When the record last changed.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_updated_date_time_utc: Option<String>,
    /// Service error code for failed registrations.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_code: Option<u32>,
    /// Service error message for failed registrations.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
    /// Custom payload returned by the allocation logic.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub payload: Option<ciborium::Value>,
}

/// Transport-specific result object.
///
/// Opaque to the state machine; handed back to the caller alongside the
/// body so they can inspect protocol details (status code, raw packet).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProtocolResult {
    /// Protocol status code, when the transport has one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status_code: Option<u16>,
    /// Raw response bytes as received.
    #[serde(default)]
    pub raw: Bytes,
}

impl ProtocolResult {
    /// Result carrying only a status code.
    pub fn status(status_code: u16) -> Self {
        Self { status_code: Some(status_code), raw: Bytes::new() }
    }
}

/// One transport completion.
///
/// Produced for every registration request and status query, consumed
/// immediately by the state machine and never retained.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseEnvelope {
    /// Transport-level failure, if any.
    pub error: Option<TransportError>,
    /// Response body.
    pub body: Option<RegistrationBody>,
    /// Protocol result object.
    pub result: Option<ProtocolResult>,
    /// Service-directed delay before the next status query.
    pub polling_interval: Option<Duration>,
}

impl ResponseEnvelope {
    /// Successful completion carrying a body.
    pub fn ok(body: RegistrationBody) -> Self {
        Self { body: Some(body), ..Self::default() }
    }

    /// Failed completion.
    pub fn failed(error: TransportError) -> Self {
        Self { error: Some(error), ..Self::default() }
    }

    /// Attach a protocol result.
    #[must_use]
    pub fn with_result(mut self, result: ProtocolResult) -> Self {
        self.result = Some(result);
        self
    }

    /// Attach a polling interval.
    #[must_use]
    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = Some(interval);
        self
    }
}
