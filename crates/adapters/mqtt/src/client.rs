//! Client handle: command publishing and subscription management.

use std::time::Duration;

use rumqttc::{AsyncClient, QoS};

use greenhub_app::ports::{BusSubscriber, CommandPublisher};
use greenhub_domain::error::GreenHubError;
use greenhub_domain::telemetry::Properties;

use crate::config::MqttConfig;
use crate::driver::MqttDriver;
use crate::error::MqttError;

/// Create the client handle and the driver owning its event loop.
///
/// Nothing touches the network until [`MqttDriver::run`] polls.
#[must_use]
pub fn connect(config: &MqttConfig) -> (MqttClient, MqttDriver) {
    let (client, eventloop) = AsyncClient::new(config.options(), config.request_capacity);
    let driver = MqttDriver::new(
        client.clone(),
        eventloop,
        config.reconnect_delay(),
        config.max_initial_attempts,
    );
    (
        MqttClient::new(client, config.publish_timeout()),
        driver,
    )
}

/// Cloneable handle over the rumqttc client.
#[derive(Clone)]
pub struct MqttClient {
    client: AsyncClient,
    publish_timeout: Duration,
}

impl MqttClient {
    pub(crate) fn new(client: AsyncClient, publish_timeout: Duration) -> Self {
        Self {
            client,
            publish_timeout,
        }
    }

    async fn publish_bytes(&self, topic: &str, payload: Vec<u8>) -> Result<(), MqttError> {
        let send = self.client.publish(topic, QoS::AtMostOnce, false, payload);
        match tokio::time::timeout(self.publish_timeout, send).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(MqttError::PublishTimeout {
                topic: topic.to_string(),
                timeout: self.publish_timeout,
            }),
        }
    }
}

impl CommandPublisher for MqttClient {
    async fn publish(&self, topic: &str, payload: &Properties) -> Result<(), GreenHubError> {
        let bytes = serde_json::to_vec(payload).map_err(MqttError::from)?;
        self.publish_bytes(topic, bytes).await?;
        tracing::debug!(%topic, "command published");
        Ok(())
    }
}

impl BusSubscriber for MqttClient {
    async fn subscribe(&self, topic: &str) -> Result<(), GreenHubError> {
        self.client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(MqttError::from)?;
        tracing::debug!(%topic, "subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), GreenHubError> {
        self.client
            .unsubscribe(topic)
            .await
            .map_err(MqttError::from)?;
        tracing::debug!(%topic, "unsubscribed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::MqttOptions;
    use serde_json::json;

    fn props(value: serde_json::Value) -> Properties {
        match value {
            serde_json::Value::Object(map) => map,
            _ => Properties::new(),
        }
    }

    #[tokio::test]
    async fn should_accept_publish_while_queue_has_room() {
        let (client, _eventloop) =
            AsyncClient::new(MqttOptions::new("test", "localhost", 1883), 4);
        let client = MqttClient::new(client, Duration::from_secs(1));

        let result = client
            .publish("zigbee2mqtt/valve-1/set", &props(json!({"state": "ON"})))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn should_time_out_when_request_queue_stays_full() {
        let (client, _eventloop) =
            AsyncClient::new(MqttOptions::new("test", "localhost", 1883), 1);
        let client = MqttClient::new(client, Duration::from_millis(100));

        client
            .publish("zigbee2mqtt/a/set", &props(json!({"state": "ON"})))
            .await
            .unwrap();
        let result = client
            .publish("zigbee2mqtt/b/set", &props(json!({"state": "ON"})))
            .await;

        assert!(matches!(result, Err(GreenHubError::Bus(_))));
    }

    #[tokio::test]
    async fn should_fail_when_event_loop_dropped() {
        let (client, eventloop) = AsyncClient::new(MqttOptions::new("test", "localhost", 1883), 4);
        drop(eventloop);
        let client = MqttClient::new(client, Duration::from_secs(1));

        let result = client.subscribe("zigbee2mqtt/bridge/devices").await;

        assert!(matches!(result, Err(GreenHubError::Bus(_))));
    }
}
