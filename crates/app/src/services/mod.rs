//! Application services: dashboard-facing use-cases.
//!
//! Each service struct accepts port trait implementations via generic parameters
//! (constructor injection), keeping this layer decoupled from concrete adapters.

pub mod device_service;
pub mod scenario_service;
pub mod schedule_service;
