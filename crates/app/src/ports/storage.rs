//! Storage port: the persistence gateway consumed by the core.

use std::future::Future;

use greenhub_domain::device::Device;
use greenhub_domain::error::GreenHubError;
use greenhub_domain::id::{DeviceAddress, ScenarioId, ScheduleId};
use greenhub_domain::scenario::Scenario;
use greenhub_domain::schedule::Schedule;
use greenhub_domain::telemetry::TelemetryRecord;

/// Durable copy of the device list (metadata and capabilities only).
pub trait DeviceRepository {
    /// Insert or replace every given device, keyed by address.
    fn upsert_all(&self, devices: Vec<Device>)
    -> impl Future<Output = Result<(), GreenHubError>> + Send;

    /// Get all persisted devices. Telemetry is never persisted here.
    fn get_all(&self) -> impl Future<Output = Result<Vec<Device>, GreenHubError>> + Send;
}

/// Append-only store of raw telemetry payloads.
pub trait TelemetryHistoryRepository {
    /// Append one record.
    fn record(
        &self,
        record: TelemetryRecord,
    ) -> impl Future<Output = Result<(), GreenHubError>> + Send;

    /// Most recent record of a device, if any.
    fn latest(
        &self,
        device: &DeviceAddress,
    ) -> impl Future<Output = Result<Option<TelemetryRecord>, GreenHubError>> + Send;

    /// Up to `limit` most recent records of a device, newest first.
    fn recent(
        &self,
        device: &DeviceAddress,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<TelemetryRecord>, GreenHubError>> + Send;
}

/// Repository for persisting and querying [`Scenario`]s.
pub trait ScenarioRepository {
    /// Persist a new scenario and return it with its assigned id.
    fn create(
        &self,
        scenario: Scenario,
    ) -> impl Future<Output = Result<Scenario, GreenHubError>> + Send;

    /// Get all scenarios.
    fn get_all(&self) -> impl Future<Output = Result<Vec<Scenario>, GreenHubError>> + Send;

    /// Delete a scenario, returning whether a row existed.
    fn delete(&self, id: ScenarioId) -> impl Future<Output = Result<bool, GreenHubError>> + Send;
}

/// Repository for persisting and querying [`Schedule`]s.
pub trait ScheduleRepository {
    /// Persist a new schedule and return it with its assigned id.
    fn create(
        &self,
        schedule: Schedule,
    ) -> impl Future<Output = Result<Schedule, GreenHubError>> + Send;

    /// Get all well-formed schedules. Rows that cannot be decoded are
    /// skipped by the implementation.
    fn get_all(&self) -> impl Future<Output = Result<Vec<Schedule>, GreenHubError>> + Send;

    /// Delete a schedule, returning whether a row existed.
    fn delete(&self, id: ScheduleId) -> impl Future<Output = Result<bool, GreenHubError>> + Send;
}
