//! Device: a wireless sensor or actuator announced on the discovery topic.

mod expose;

pub use expose::{Access, Expose};

use serde::{Deserialize, Serialize};

use crate::error::{GreenHubError, ValidationError};
use crate::id::DeviceAddress;
use crate::telemetry::Telemetry;

/// One entry of the discovery payload, as announced by the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub ieee_address: DeviceAddress,
    pub friendly_name: String,
    /// Network role (`Coordinator`, `Router`, `EndDevice`).
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    /// Absent for the coordinator and for devices the bridge does not support.
    #[serde(default)]
    pub definition: Option<Definition>,
}

/// Model-level description of a device and its capabilities.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Definition {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub exposes: Vec<Expose>,
}

impl DeviceDescriptor {
    /// Decode a full discovery payload.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the payload is not a list of descriptors.
    pub fn decode_list(payload: &[u8]) -> Result<Vec<Self>, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Check identity invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] when the address or the friendly
    /// name is empty.
    pub fn validate(&self) -> Result<(), GreenHubError> {
        if self.ieee_address.as_str().is_empty() || self.friendly_name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        Ok(())
    }
}

/// A known device with its latest telemetry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub address: DeviceAddress,
    pub friendly_name: String,
    pub kind: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub description: String,
    pub exposes: Vec<Expose>,
    /// `None` until the first telemetry report (live or persisted) is known.
    pub telemetry: Option<Telemetry>,
}

impl Device {
    /// Replace metadata and capability list from a newer descriptor,
    /// preserving the telemetry snapshot.
    pub fn apply_descriptor(&mut self, descriptor: &DeviceDescriptor) {
        let definition = descriptor.definition.clone().unwrap_or_default();
        self.friendly_name.clone_from(&descriptor.friendly_name);
        self.kind.clone_from(&descriptor.kind);
        self.manufacturer.clone_from(&descriptor.manufacturer);
        self.model.clone_from(&descriptor.model_id);
        self.description = definition.description;
        self.exposes = definition.exposes;
    }

    /// Properties this device accepts commands for.
    pub fn settable_properties(&self) -> impl Iterator<Item = &str> {
        self.exposes
            .iter()
            .flat_map(Expose::flatten)
            .filter(|expose| expose.is_settable())
            .filter_map(|expose| expose.property.as_deref())
    }
}

impl From<&DeviceDescriptor> for Device {
    fn from(descriptor: &DeviceDescriptor) -> Self {
        let mut device = Self {
            address: descriptor.ieee_address.clone(),
            friendly_name: String::new(),
            kind: String::new(),
            manufacturer: None,
            model: None,
            description: String::new(),
            exposes: Vec::new(),
            telemetry: None,
        };
        device.apply_descriptor(descriptor);
        device
    }
}
