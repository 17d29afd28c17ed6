//! Message bus ports: outbound commands and topic subscriptions.

use std::future::Future;
use std::sync::Arc;

use greenhub_domain::error::GreenHubError;
use greenhub_domain::telemetry::Properties;

/// The sole component issuing outbound actuation messages.
///
/// Delivery is fire-and-forget: no retry and no persistence of
/// unacknowledged sends. Implementations wait for the local send
/// acknowledgement, bounded by a timeout.
pub trait CommandPublisher: Send + Sync {
    /// Serialize `payload` as a JSON object and publish it on `topic`.
    fn publish(
        &self,
        topic: &str,
        payload: &Properties,
    ) -> impl Future<Output = Result<(), GreenHubError>> + Send;
}

/// Manages the hub's topic subscriptions on the bus.
pub trait BusSubscriber: Send + Sync {
    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<(), GreenHubError>> + Send;

    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), GreenHubError>> + Send;
}

impl<T: CommandPublisher> CommandPublisher for Arc<T> {
    fn publish(
        &self,
        topic: &str,
        payload: &Properties,
    ) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        (**self).publish(topic, payload)
    }
}

impl<T: BusSubscriber> BusSubscriber for Arc<T> {
    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        (**self).subscribe(topic)
    }

    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        (**self).unsubscribe(topic)
    }
}
