//! MQTT integration configuration.

use std::time::Duration;

use rumqttc::MqttOptions;
use serde::Deserialize;

use greenhub_domain::topic::DEFAULT_BASE_TOPIC;

/// Configuration for the MQTT integration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Base topic of the zigbee2mqtt bridge.
    pub base_topic: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Upper bound on waiting for a publish to be accepted, in milliseconds.
    pub publish_timeout_ms: u64,
    /// Pause between reconnection attempts, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Failed attempts tolerated before the first successful connection.
    pub max_initial_attempts: u32,
    /// Pairing window opened by a permit-join request, in seconds.
    pub permit_join_secs: u64,
    /// Capacity of the client's request queue.
    pub request_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "greenhub".to_string(),
            base_topic: DEFAULT_BASE_TOPIC.to_string(),
            keep_alive_secs: 30,
            username: None,
            password: None,
            publish_timeout_ms: 5_000,
            reconnect_delay_ms: 2_000,
            max_initial_attempts: 5,
            permit_join_secs: 50,
            request_capacity: 64,
        }
    }
}

impl MqttConfig {
    #[must_use]
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Build the rumqttc connection options.
    #[must_use]
    pub fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.broker_host, self.broker_port);
        options.set_keep_alive(Duration::from_secs(u64::from(self.keep_alive_secs)));
        options.set_clean_session(true);
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            options.set_credentials(username, password);
        }
        options
    }
}
