//! MQTT adapter error types.

use std::time::Duration;

use greenhub_domain::error::GreenHubError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The rumqttc client rejected a request.
    #[error("MQTT client error")]
    Client(#[from] rumqttc::ClientError),

    /// A command payload could not be serialized.
    #[error("failed to serialize MQTT payload")]
    PayloadSerialize(#[from] serde_json::Error),

    /// The request was not accepted by the event loop in time.
    #[error("publish on {topic} not acknowledged within {timeout:?}")]
    PublishTimeout { topic: String, timeout: Duration },

    /// The broker could not be reached before the first connection.
    #[error("MQTT broker unreachable after {attempts} attempts")]
    Unreachable {
        attempts: u32,
        #[source]
        source: rumqttc::ConnectionError,
    },
}

impl MqttError {
    /// Convert into a [`GreenHubError::Bus`] for propagation across port
    /// boundaries.
    pub fn into_domain(self) -> GreenHubError {
        GreenHubError::Bus(Box::new(self))
    }
}

impl From<MqttError> for GreenHubError {
    fn from(err: MqttError) -> Self {
        err.into_domain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_publish_timeout() {
        let err = MqttError::PublishTimeout {
            topic: "zigbee2mqtt/valve-1/set".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(
            err.to_string(),
            "publish on zigbee2mqtt/valve-1/set not acknowledged within 5s"
        );
    }

    #[test]
    fn should_convert_into_bus_error() {
        let err: GreenHubError = MqttError::PublishTimeout {
            topic: "t".to_string(),
            timeout: Duration::from_millis(10),
        }
        .into();
        assert!(matches!(err, GreenHubError::Bus(_)));
    }

    #[test]
    fn should_display_payload_serialize_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{{bad").unwrap_err();
        let err = MqttError::PayloadSerialize(json_err);
        assert_eq!(err.to_string(), "failed to serialize MQTT payload");
    }
}
