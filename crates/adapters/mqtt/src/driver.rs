//! Event-loop driver.
//!
//! Polls the rumqttc event loop until shutdown. Each broker acknowledgement
//! triggers a full resubscription, every incoming publish is handed to the
//! sink, and transport errors are reported before backing off. The first
//! connection must succeed within a bounded number of attempts; later losses
//! are retried indefinitely.

use std::future::Future;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet};
use tokio_util::sync::CancellationToken;

use greenhub_app::ingestion::IngestionPipeline;
use greenhub_app::ports::{BusSubscriber, CommandPublisher, DeviceRepository, TelemetryHistoryRepository};

use crate::error::MqttError;

const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Receiver of connection-level events and incoming messages.
pub trait BusEventSink: Clone + Send + Sync + 'static {
    fn on_connecting(&self);

    /// Called on every connection acknowledgement, from its own task.
    fn on_connected(&self) -> impl Future<Output = ()> + Send;

    fn on_disconnected(&self, reason: &str);

    /// Must not wait on the bus: the event loop is blocked meanwhile.
    fn dispatch(&self, topic: &str, payload: Vec<u8>) -> impl Future<Output = ()> + Send;
}

impl<DR, HR, P, S> BusEventSink for IngestionPipeline<DR, HR, P, S>
where
    DR: DeviceRepository + Send + Sync + 'static,
    HR: TelemetryHistoryRepository + Send + Sync + 'static,
    P: CommandPublisher + 'static,
    S: BusSubscriber + 'static,
{
    fn on_connecting(&self) {
        IngestionPipeline::on_connecting(self);
    }

    fn on_connected(&self) -> impl Future<Output = ()> + Send {
        IngestionPipeline::on_connected(self)
    }

    fn on_disconnected(&self, reason: &str) {
        IngestionPipeline::on_disconnected(self, reason);
    }

    fn dispatch(&self, topic: &str, payload: Vec<u8>) -> impl Future<Output = ()> + Send {
        IngestionPipeline::dispatch(self, topic, payload)
    }
}

/// Owner of the rumqttc event loop.
pub struct MqttDriver {
    client: AsyncClient,
    eventloop: EventLoop,
    reconnect_delay: Duration,
    max_initial_attempts: u32,
}

impl MqttDriver {
    pub(crate) fn new(
        client: AsyncClient,
        eventloop: EventLoop,
        reconnect_delay: Duration,
        max_initial_attempts: u32,
    ) -> Self {
        Self {
            client,
            eventloop,
            reconnect_delay,
            max_initial_attempts,
        }
    }

    /// Poll the event loop until `shutdown` is cancelled, then disconnect
    /// cleanly from the broker.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::Unreachable`] when the broker refused or could not
    /// be reached on every one of the initial attempts.
    pub async fn run<H: BusEventSink>(
        mut self,
        sink: H,
        shutdown: CancellationToken,
    ) -> Result<(), MqttError> {
        let mut ever_connected = false;
        let mut connected = false;
        let mut failures = 0_u32;
        sink.on_connecting();

        loop {
            let event = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                event = self.eventloop.poll() => event,
            };
            match event {
                Ok(event) => {
                    if handle_event(&sink, event).await {
                        ever_connected = true;
                        connected = true;
                        failures = 0;
                    }
                }
                Err(err) => {
                    connected = false;
                    failures = failures.saturating_add(1);
                    sink.on_disconnected(&err.to_string());
                    if !ever_connected && failures >= self.max_initial_attempts {
                        return Err(MqttError::Unreachable {
                            attempts: failures,
                            source: err,
                        });
                    }
                    tokio::select! {
                        biased;
                        () = shutdown.cancelled() => break,
                        () = tokio::time::sleep(self.reconnect_delay) => {}
                    }
                    sink.on_connecting();
                }
            }
        }

        if connected {
            self.disconnect().await;
        }
        tracing::info!("mqtt driver stopped");
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Err(err) = self.client.try_disconnect() {
            tracing::warn!(error = %err, "failed to queue broker disconnect");
            return;
        }
        let flush = async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(DISCONNECT_TIMEOUT, flush).await.is_err() {
            tracing::warn!("broker disconnect not flushed in time");
        }
    }
}

/// Returns `true` when the event is a connection acknowledgement.
async fn handle_event<H: BusEventSink>(sink: &H, event: Event) -> bool {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) => {
            tracing::info!(session_present = ack.session_present, "connected to broker");
            let sink = sink.clone();
            tokio::spawn(async move { sink.on_connected().await });
            true
        }
        Event::Incoming(Packet::Publish(publish)) => {
            sink.dispatch(&publish.topic, publish.payload.to_vec()).await;
            false
        }
        _ => false,
    }
}
