//! # greenhub-adapter-mqtt
//!
//! MQTT adapter: connects the hub to a zigbee2mqtt bridge.
//!
//! ## Responsibilities
//! - Connect to the MQTT broker ([`connect`])
//! - Publish actuation commands ([`MqttClient`] implements `CommandPublisher`)
//! - Manage topic subscriptions ([`MqttClient`] implements `BusSubscriber`)
//! - Drive the event loop: hand every incoming publish to the ingestion
//!   pipeline, report connection loss, back off, and resubscribe after each
//!   reconnect ([`MqttDriver`])
//!
//! ## Dependency rule
//! Same as other adapters: depends on `greenhub-app` and `greenhub-domain`.

pub mod config;
pub mod error;

mod client;
mod driver;

pub use client::{MqttClient, connect};
pub use config::MqttConfig;
pub use driver::{BusEventSink, MqttDriver};
pub use error::MqttError;
