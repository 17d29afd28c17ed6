//! Device registry: the in-memory owner of device and telemetry state.
//!
//! Readers get cloned snapshots and never hold the lock while they work.
//! Every mutation takes the write lock, so no reader can observe a
//! partially-updated device.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use greenhub_domain::device::{Device, DeviceDescriptor};
use greenhub_domain::error::{GreenHubError, NotFoundError};
use greenhub_domain::id::DeviceAddress;
use greenhub_domain::telemetry::Telemetry;

/// What an upsert changed, for logging and subscription bookkeeping.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpsertReport {
    pub added: Vec<DeviceAddress>,
    /// Devices whose friendly name changed, with their previous name.
    pub renamed: Vec<(DeviceAddress, String)>,
    pub updated: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct RegistryState {
    devices: HashMap<DeviceAddress, Device>,
    names: HashMap<String, DeviceAddress>,
}

impl RegistryState {
    fn claim_name(&mut self, name: &str, address: &DeviceAddress) {
        self.names.insert(name.to_string(), address.clone());
    }

    fn release_name(&mut self, name: &str, address: &DeviceAddress) {
        if self.names.get(name) == Some(address) {
            self.names.remove(name);
        }
    }
}

/// Thread-safe store of every known device.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    state: RwLock<RegistryState>,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unknown devices and refresh the metadata of known ones.
    ///
    /// Telemetry snapshots are never touched. Applying the same list twice
    /// leaves the registry as applying it once. Descriptors failing
    /// validation are skipped.
    pub async fn upsert_devices(&self, descriptors: &[DeviceDescriptor]) -> UpsertReport {
        let mut report = UpsertReport::default();
        let mut state = self.state.write().await;
        for descriptor in descriptors {
            if let Err(err) = descriptor.validate() {
                tracing::warn!(
                    address = %descriptor.ieee_address,
                    error = %err,
                    "skipping invalid device descriptor"
                );
                report.skipped += 1;
                continue;
            }
            let address = &descriptor.ieee_address;
            let previous_name = match state.devices.get_mut(address) {
                Some(device) => {
                    let previous = device.friendly_name.clone();
                    device.apply_descriptor(descriptor);
                    Some(previous)
                }
                None => {
                    state
                        .devices
                        .insert(address.clone(), Device::from(descriptor));
                    None
                }
            };
            match previous_name {
                None => report.added.push(address.clone()),
                Some(previous) if previous != descriptor.friendly_name => {
                    state.release_name(&previous, address);
                    report.renamed.push((address.clone(), previous));
                }
                Some(_) => report.updated += 1,
            }
            state.claim_name(&descriptor.friendly_name, address);
        }
        report
    }

    /// Remove every device whose address is not in `present`, returning the
    /// removed devices.
    pub async fn remove_absent(&self, present: &HashSet<DeviceAddress>) -> Vec<Device> {
        let mut state = self.state.write().await;
        let absent: Vec<DeviceAddress> = state
            .devices
            .keys()
            .filter(|address| !present.contains(*address))
            .cloned()
            .collect();
        let mut removed = Vec::with_capacity(absent.len());
        for address in absent {
            if let Some(device) = state.devices.remove(&address) {
                state.release_name(&device.friendly_name, &address);
                removed.push(device);
            }
        }
        removed
    }

    /// Replace a device's telemetry snapshot wholesale.
    ///
    /// Returns the updated device and the previous snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::NotFound`] if the address is unknown.
    pub async fn update_telemetry(
        &self,
        address: &DeviceAddress,
        telemetry: Telemetry,
    ) -> Result<(Device, Option<Telemetry>), GreenHubError> {
        let mut state = self.state.write().await;
        let device = state
            .devices
            .get_mut(address)
            .ok_or_else(|| not_found(address.as_str()))?;
        let previous = device.telemetry.replace(telemetry);
        Ok((device.clone(), previous))
    }

    /// Set a snapshot only if the device has none yet.
    ///
    /// Returns whether the snapshot was applied.
    pub async fn seed_telemetry(&self, address: &DeviceAddress, telemetry: Telemetry) -> bool {
        let mut state = self.state.write().await;
        match state.devices.get_mut(address) {
            Some(device) if device.telemetry.is_none() => {
                device.telemetry = Some(telemetry);
                true
            }
            _ => false,
        }
    }

    /// Look up a device by friendly name.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::NotFound`] if no device carries that name.
    pub async fn get_by_name(&self, name: &str) -> Result<Device, GreenHubError> {
        let state = self.state.read().await;
        state
            .names
            .get(name)
            .and_then(|address| state.devices.get(address))
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    pub async fn get(&self, address: &DeviceAddress) -> Option<Device> {
        self.state.read().await.devices.get(address).cloned()
    }

    pub async fn contains(&self, address: &DeviceAddress) -> bool {
        self.state.read().await.devices.contains_key(address)
    }

    /// Copy of every device, ordered by friendly name.
    pub async fn list(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.state.read().await.devices.values().cloned().collect();
        devices.sort_by(|a, b| a.friendly_name.cmp(&b.friendly_name));
        devices
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.devices.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.devices.is_empty()
    }
}

fn not_found(id: &str) -> GreenHubError {
    NotFoundError {
        entity: "Device",
        id: id.to_string(),
    }
    .into()
}
