//! # greenhub-domain
//!
//! Pure domain model for the greenhub greenhouse automation hub.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - **Devices** announced by the bridge, with their capability descriptors
//! - **Telemetry** snapshots and persisted history records
//! - **Scenarios** (single-condition rules) and their comparison operators
//! - **Schedules** (time-triggered commands) and their recurrence
//! - Bus topic naming and chart series extraction
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod chart;
pub mod device;
pub mod scenario;
pub mod schedule;
pub mod telemetry;
pub mod topic;
