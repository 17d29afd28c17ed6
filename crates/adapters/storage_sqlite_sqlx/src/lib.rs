//! # greenhub-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the repository port traits defined in `greenhub-app::ports::storage`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows
//!
//! ## Dependency rule
//! Depends on `greenhub-app` (for port traits) and `greenhub-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod error;
pub mod pool;

mod device_repo;
mod scenario_repo;
mod schedule_repo;
mod telemetry_repo;

pub use device_repo::SqliteDeviceRepository;
pub use error::StorageError;
pub use pool::{Config, Database};
pub use scenario_repo::SqliteScenarioRepository;
pub use schedule_repo::SqliteScheduleRepository;
pub use telemetry_repo::SqliteTelemetryHistoryRepository;
