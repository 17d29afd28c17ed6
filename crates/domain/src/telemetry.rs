//! Telemetry: a device's self-reported state.
//!
//! Every telemetry message is a complete state report, so a snapshot is
//! always replaced wholesale, never merged.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id::DeviceAddress;
use crate::time::Timestamp;

/// Property → value mapping, used both for telemetry and command payloads.
pub type Properties = Map<String, Value>;

/// Latest reported state of one device.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Telemetry(Properties);

impl Telemetry {
    #[must_use]
    pub fn new(properties: Properties) -> Self {
        Self(properties)
    }

    /// Decode a raw telemetry payload. The payload must be a JSON object.
    ///
    /// # Errors
    ///
    /// Returns the JSON error for anything but an object.
    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload).map(Self)
    }

    #[must_use]
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.0.get(property)
    }

    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether every key of `payload` is present here with a matching value.
    ///
    /// An empty `payload` is trivially contained.
    #[must_use]
    pub fn contains_all(&self, payload: &Properties) -> bool {
        payload.iter().all(|(key, expected)| {
            self.0
                .get(key)
                .is_some_and(|actual| values_match(actual, expected))
        })
    }
}

impl From<Properties> for Telemetry {
    fn from(value: Properties) -> Self {
        Self(value)
    }
}

/// A persisted raw telemetry message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub device: DeviceAddress,
    pub recorded_at: Timestamp,
    /// Raw payload exactly as received from the bus.
    pub payload: String,
}

impl TelemetryRecord {
    /// Decode the stored payload back into a snapshot.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the stored payload is not a JSON object.
    pub fn snapshot(&self) -> Result<Telemetry, serde_json::Error> {
        Telemetry::from_json(self.payload.as_bytes())
    }
}

/// Textual form of a scalar JSON value; `None` for null, arrays, and objects.
#[must_use]
pub fn scalar_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Numeric reading of a JSON value: numbers, or strings that parse as numbers.
#[must_use]
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Loose equality: identical JSON, equal numbers, or identical scalar text
/// (so the command value `"100"` matches a reported `100`).
#[must_use]
#[allow(clippy::float_cmp)]
pub fn values_match(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    if let (Some(a), Some(b)) = (as_number(actual), as_number(expected)) {
        return a == b;
    }
    match (scalar_text(actual), scalar_text(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
