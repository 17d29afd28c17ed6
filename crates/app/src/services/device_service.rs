//! Device service: dashboard use-cases over the live device registry.

use std::sync::Arc;

use serde_json::{Value, json};

use greenhub_domain::chart::{ChartPoint, DEFAULT_CHART_LIMIT, chart_series};
use greenhub_domain::device::Device;
use greenhub_domain::error::{GreenHubError, ValidationError};
use greenhub_domain::telemetry::Properties;
use greenhub_domain::topic::Topics;

use crate::ports::{CommandPublisher, TelemetryHistoryRepository};
use crate::registry::DeviceRegistry;

/// Default pairing window opened by [`DeviceService::permit_join`].
pub const DEFAULT_PERMIT_JOIN_SECS: u64 = 50;

/// Application service for reading devices and sending them commands.
pub struct DeviceService<HR, P> {
    registry: Arc<DeviceRegistry>,
    history: Arc<HR>,
    publisher: Arc<P>,
    topics: Topics,
    permit_join_secs: u64,
}

impl<HR, P> DeviceService<HR, P>
where
    HR: TelemetryHistoryRepository + Send + Sync,
    P: CommandPublisher,
{
    pub fn new(
        registry: Arc<DeviceRegistry>,
        history: Arc<HR>,
        publisher: Arc<P>,
        topics: Topics,
    ) -> Self {
        Self {
            registry,
            history,
            publisher,
            topics,
            permit_join_secs: DEFAULT_PERMIT_JOIN_SECS,
        }
    }

    /// Override the default pairing window.
    #[must_use]
    pub fn with_permit_join_secs(mut self, secs: u64) -> Self {
        self.permit_join_secs = secs;
        self
    }

    /// List all known devices with their latest telemetry.
    pub async fn list_devices(&self) -> Vec<Device> {
        self.registry.list().await
    }

    /// Look up a device by friendly name.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::NotFound`] when no device carries that name.
    #[tracing::instrument(skip(self))]
    pub async fn get_device(&self, name: &str) -> Result<Device, GreenHubError> {
        self.registry.get_by_name(name).await
    }

    /// Chart one numeric property from the device's recent history, oldest
    /// point first.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::NotFound`] for an unknown device,
    /// [`ValidationError::NonNumericValue`] when the property holds
    /// non-numeric values, or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn chart_series(
        &self,
        name: &str,
        property: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ChartPoint>, GreenHubError> {
        if property.trim().is_empty() {
            return Err(ValidationError::EmptyProperty.into());
        }
        let device = self.registry.get_by_name(name).await?;
        let limit = limit.unwrap_or(DEFAULT_CHART_LIMIT);
        let records = self.history.recent(&device.address, limit).await?;
        Ok(chart_series(&records, property)?)
    }

    /// Send `{property: value}` to the device's command topic.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::NotFound`] for an unknown device,
    /// [`ValidationError::EmptyProperty`] for an empty property, or the
    /// publisher's error.
    #[tracing::instrument(skip(self, value))]
    pub async fn device_action(
        &self,
        name: &str,
        property: &str,
        value: Value,
    ) -> Result<(), GreenHubError> {
        if property.trim().is_empty() {
            return Err(ValidationError::EmptyProperty.into());
        }
        let device = self.registry.get_by_name(name).await?;
        let mut payload = Properties::new();
        payload.insert(property.to_string(), value);
        self.publisher
            .publish(&self.topics.command(&device.friendly_name), &payload)
            .await
    }

    /// Ask the bridge to accept new devices for `secs` seconds (default
    /// window when `None`). Returns the window that was requested.
    ///
    /// # Errors
    ///
    /// Returns the publisher's error.
    #[tracing::instrument(skip(self))]
    pub async fn permit_join(&self, secs: Option<u64>) -> Result<u64, GreenHubError> {
        let secs = secs.unwrap_or(self.permit_join_secs);
        let payload = match json!({ "time": secs }) {
            Value::Object(map) => map,
            _ => Properties::new(),
        };
        self.publisher
            .publish(&self.topics.permit_join(), &payload)
            .await?;
        Ok(secs)
    }
}
