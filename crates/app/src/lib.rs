//! # greenhub-app
//!
//! Application layer: the hub's core and its **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `DeviceRepository`, `TelemetryHistoryRepository`: device list and history
//!   - `ScenarioRepository`, `ScheduleRepository`: persisted rules and timers
//!   - `CommandPublisher`, `BusSubscriber`: the message bus
//! - Own the **shared in-memory state**: the device registry, the scenario
//!   working set, and the schedule timer table
//! - Run the **ingestion pipeline** (discovery and telemetry workers), the
//!   **rule engine**, the **scheduler**, and the background history writer
//! - Expose **driving/inbound ports** as services for the dashboard
//!
//! ## Dependency rule
//! Depends on `greenhub-domain` only (plus `tokio` and `tokio-util` for tasks,
//! locks, and cancellation). Never imports adapter crates. Adapters depend on
//! *this* crate, not the reverse.

pub mod history;
pub mod ingestion;
pub mod ports;
pub mod registry;
pub mod rule_engine;
pub mod scheduler;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;
