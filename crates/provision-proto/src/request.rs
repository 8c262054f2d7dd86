//! Registration request types.

use serde::{Deserialize, Serialize};

/// Identity and routing parameters for one registration attempt.
///
/// Immutable once submitted. The state machine holds on to it for the whole
/// attempt because every status query is issued against the same request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    /// Registration id of the device.
    pub registration_id: String,
    /// Provisioning service scope the device registers under.
    pub id_scope: String,
    /// Host name of the provisioning service.
    pub provisioning_host: String,
    /// Ask the service to re-run assignment even if the device is already
    /// assigned.
    #[serde(default)]
    pub force_registration: bool,
}

impl RegistrationRequest {
    /// Create a request with the given registration id and scope.
    pub fn new(registration_id: impl Into<String>, id_scope: impl Into<String>) -> Self {
        Self {
            registration_id: registration_id.into(),
            id_scope: id_scope.into(),
            provisioning_host: String::new(),
            force_registration: false,
        }
    }

    /// Set the provisioning host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.provisioning_host = host.into();
        self
    }

    /// Set the force-registration flag.
    #[must_use]
    pub fn with_force_registration(mut self, force: bool) -> Self {
        self.force_registration = force;
        self
    }
}

/// Body sent with the initial registration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    /// Registration id echoed in the body.
    pub registration_id: String,
    /// Custom payload forwarded to the service's allocation logic.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub payload: Option<ciborium::Value>,
}

impl RequestBody {
    /// Body with no custom payload.
    pub fn new(registration_id: impl Into<String>) -> Self {
        Self { registration_id: registration_id.into(), payload: None }
    }

    /// Attach a custom payload.
    #[must_use]
    pub fn with_payload(mut self, payload: ciborium::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}
