//! Capability descriptors ("exposes"): what a device can report or accept.

use serde::{Deserialize, Serialize};

/// Access-mode bitmask of a capability.
///
/// | Bit | Meaning |
/// |-----|---------|
/// | `1` | published in telemetry |
/// | `2` | settable through the command topic |
/// | `4` | readable on demand |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Access(u8);

impl Access {
    pub const PUBLISHED: Self = Self(0b001);
    pub const SET: Self = Self(0b010);
    pub const GET: Self = Self(0b100);

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl From<u8> for Access {
    fn from(bits: u8) -> Self {
        Self(bits)
    }
}

/// One observable or controllable property of a device.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Expose {
    /// Capability type (`numeric`, `binary`, `enum`, `light`, …).
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    /// Key of this capability inside telemetry and command payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default)]
    pub access: Access,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_step: Option<f64>,
    /// Enumerated value set for `enum` capabilities.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<serde_json::Value>,
    /// Nested capabilities of composite types (a light's state + brightness).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<Expose>,
}

impl Expose {
    /// Whether the capability accepts commands.
    #[must_use]
    pub fn is_settable(&self) -> bool {
        self.access.contains(Access::SET)
    }

    /// Whether the capability appears in telemetry.
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.access.contains(Access::PUBLISHED)
    }

    /// Depth-first iterator over this capability and all nested features.
    pub fn flatten(&self) -> impl Iterator<Item = &Expose> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(next.features.iter().rev());
            Some(next)
        })
    }
}
