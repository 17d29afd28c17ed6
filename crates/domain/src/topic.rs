//! Bus topic naming for a zigbee2mqtt-style bridge.

/// Default topic prefix of the bridge.
pub const DEFAULT_BASE_TOPIC: &str = "zigbee2mqtt";

/// Derives every topic the hub subscribes or publishes to from one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    base: String,
}

impl Topics {
    /// Trailing slashes of `base` are ignored.
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Topic on which the bridge announces the device list.
    #[must_use]
    pub fn devices(&self) -> String {
        format!("{}/bridge/devices", self.base)
    }

    /// Telemetry topic of one device.
    #[must_use]
    pub fn telemetry(&self, friendly_name: &str) -> String {
        format!("{}/{friendly_name}", self.base)
    }

    /// Command topic of one device.
    #[must_use]
    pub fn command(&self, friendly_name: &str) -> String {
        format!("{}/{friendly_name}/set", self.base)
    }

    #[must_use]
    pub fn permit_join(&self) -> String {
        format!("{}/bridge/request/permit_join", self.base)
    }

    /// Friendly name addressed by a telemetry topic, if `topic` is one.
    ///
    /// Bridge topics and command topics are not telemetry.
    #[must_use]
    pub fn device_name<'a>(&self, topic: &'a str) -> Option<&'a str> {
        let name = topic.strip_prefix(self.base.as_str())?.strip_prefix('/')?;
        if name.is_empty() || name.starts_with("bridge/") || name.ends_with("/set") {
            return None;
        }
        Some(name)
    }
}

impl Default for Topics {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_TOPIC)
    }
}
