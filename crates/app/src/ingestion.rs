//! Ingestion pipeline: turns bus messages into registry updates, history
//! records, and rule evaluations.
//!
//! The bus driver hands every incoming publish to
//! [`IngestionPipeline::dispatch`], which never waits: discovery payloads go
//! to a single discovery worker, telemetry payloads to the worker of the
//! device owning the topic. Each worker handles its messages strictly in
//! arrival order; different devices run in parallel.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use greenhub_domain::device::{Device, DeviceDescriptor};
use greenhub_domain::id::DeviceAddress;
use greenhub_domain::telemetry::{Telemetry, TelemetryRecord};
use greenhub_domain::topic::Topics;

use crate::history::HistoryWriter;
use crate::ports::{BusSubscriber, CommandPublisher, DeviceRepository, TelemetryHistoryRepository};
use crate::registry::DeviceRegistry;
use crate::rule_engine::RuleEngine;

/// Connection-level state of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Disconnected,
    Connecting,
    /// Subscribed to the discovery topic only.
    Subscribed,
    /// Subscribed to discovery and at least one telemetry topic.
    Listening,
    Stopped,
}

/// Queue sizes of the pipeline workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionConfig {
    pub device_queue_capacity: usize,
    pub discovery_queue_capacity: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            device_queue_capacity: 64,
            discovery_queue_capacity: 8,
        }
    }
}

/// Collaborators of the pipeline.
pub struct PipelineContext<DR, HR, P, S> {
    pub registry: Arc<DeviceRegistry>,
    pub rule_engine: Arc<RuleEngine<P>>,
    pub history: HistoryWriter,
    pub device_repo: Arc<DR>,
    pub history_repo: Arc<HR>,
    pub subscriber: Arc<S>,
    pub topics: Topics,
}

struct DeviceRoute {
    topic: String,
    sender: mpsc::Sender<Vec<u8>>,
    token: CancellationToken,
}

#[derive(Default)]
struct Routes {
    by_address: HashMap<DeviceAddress, DeviceRoute>,
    by_topic: HashMap<String, DeviceAddress>,
}

struct PipelineInner<DR, HR, P, S> {
    ctx: PipelineContext<DR, HR, P, S>,
    config: IngestionConfig,
    token: CancellationToken,
    routes: RwLock<Routes>,
    state: watch::Sender<PipelineState>,
    discovery: mpsc::Sender<Vec<u8>>,
    workers: Mutex<JoinSet<()>>,
}

/// Entry point of every bus message.
pub struct IngestionPipeline<DR, HR, P, S> {
    inner: Arc<PipelineInner<DR, HR, P, S>>,
}

impl<DR, HR, P, S> Clone for IngestionPipeline<DR, HR, P, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<DR, HR, P, S> IngestionPipeline<DR, HR, P, S>
where
    DR: DeviceRepository + Send + Sync + 'static,
    HR: TelemetryHistoryRepository + Send + Sync + 'static,
    P: CommandPublisher + 'static,
    S: BusSubscriber + 'static,
{
    /// Build the pipeline and spawn its discovery worker.
    ///
    /// Workers stop when `shutdown` is cancelled or [`Self::stop`] is called.
    ///
    /// # Panics
    ///
    /// Panics if a queue capacity is zero.
    pub fn start(
        ctx: PipelineContext<DR, HR, P, S>,
        config: IngestionConfig,
        shutdown: &CancellationToken,
    ) -> Self {
        let (discovery, receiver) = mpsc::channel(config.discovery_queue_capacity);
        let (state, _) = watch::channel(PipelineState::Disconnected);
        let pipeline = Self {
            inner: Arc::new(PipelineInner {
                ctx,
                config,
                token: shutdown.child_token(),
                routes: RwLock::new(Routes::default()),
                state,
                discovery,
                workers: Mutex::new(JoinSet::new()),
            }),
        };
        pipeline
            .workers()
            .spawn(run_discovery_worker(pipeline.clone(), receiver));
        pipeline
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        *self.inner.state.borrow()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<PipelineState> {
        self.inner.state.subscribe()
    }

    /// Telemetry topics currently routed to a device worker.
    pub async fn device_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .inner
            .routes
            .read()
            .await
            .by_topic
            .keys()
            .cloned()
            .collect();
        topics.sort();
        topics
    }

    /// The bus driver is about to (re)connect.
    pub fn on_connecting(&self) {
        self.set_state(PipelineState::Connecting);
    }

    /// The broker acknowledged a (re)connection: subscribe to discovery and
    /// re-establish every per-device subscription.
    pub async fn on_connected(&self) {
        let discovery = self.inner.ctx.topics.devices();
        if let Err(err) = self.inner.ctx.subscriber.subscribe(&discovery).await {
            tracing::warn!(topic = %discovery, error = %err, "failed to subscribe to discovery topic");
            return;
        }
        self.set_state(PipelineState::Subscribed);

        let topics = self.device_topics().await;
        for topic in &topics {
            if let Err(err) = self.inner.ctx.subscriber.subscribe(topic).await {
                tracing::warn!(%topic, error = %err, "failed to resubscribe telemetry topic");
            }
        }
        if !topics.is_empty() {
            self.set_state(PipelineState::Listening);
        }
        tracing::info!(devices = topics.len(), "bus subscriptions established");
    }

    /// The transport lost its connection; it reconnects on its own.
    pub fn on_disconnected(&self, reason: &str) {
        if self.state() != PipelineState::Stopped {
            tracing::warn!(%reason, "bus connection lost");
            self.set_state(PipelineState::Disconnected);
        }
    }

    /// Stop every worker. Queued messages are abandoned; a message already
    /// being processed runs to completion, see [`Self::join`].
    pub fn stop(&self) {
        self.inner.token.cancel();
        self.set_state(PipelineState::Stopped);
    }

    /// Wait until every worker has exited.
    ///
    /// Only returns once the workers were told to stop, by [`Self::stop`] or
    /// by the shutdown token given to [`Self::start`].
    pub async fn join(&self) {
        loop {
            let mut workers = std::mem::take(&mut *self.workers());
            if workers.is_empty() {
                break;
            }
            while let Some(result) = workers.join_next().await {
                if let Err(err) = result {
                    tracing::warn!(error = %err, "pipeline worker ended abnormally");
                }
            }
        }
        tracing::debug!("pipeline workers joined");
    }

    /// Route one incoming message without waiting.
    ///
    /// A message for a full queue is dropped with a warning, as is a message
    /// on a topic no worker owns.
    pub async fn dispatch(&self, topic: &str, payload: Vec<u8>) {
        if topic == self.inner.ctx.topics.devices() {
            if let Err(err) = self.inner.discovery.try_send(payload) {
                warn_dropped(topic, &err);
            }
            return;
        }
        let sender = {
            let routes = self.inner.routes.read().await;
            routes
                .by_topic
                .get(topic)
                .and_then(|address| routes.by_address.get(address))
                .map(|route| route.sender.clone())
        };
        match sender {
            Some(sender) => {
                if let Err(err) = sender.try_send(payload) {
                    warn_dropped(topic, &err);
                }
            }
            None => tracing::debug!(%topic, "no worker for topic, ignoring message"),
        }
    }

    /// Handle one discovery payload: refresh the registry, drop devices that
    /// disappeared, persist the device list, and align subscriptions.
    pub async fn process_discovery(&self, payload: &[u8]) {
        let descriptors = match DeviceDescriptor::decode_list(payload) {
            Ok(descriptors) => descriptors,
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed discovery payload");
                return;
            }
        };
        let ctx = &self.inner.ctx;
        let report = ctx.registry.upsert_devices(&descriptors).await;
        let present: HashSet<DeviceAddress> = descriptors
            .iter()
            .map(|descriptor| descriptor.ieee_address.clone())
            .collect();
        let removed = ctx.registry.remove_absent(&present).await;
        tracing::info!(
            added = report.added.len(),
            renamed = report.renamed.len(),
            removed = removed.len(),
            "device list refreshed"
        );

        let devices = ctx.registry.list().await;
        if let Err(err) = ctx.device_repo.upsert_all(devices.clone()).await {
            tracing::warn!(error = %err, "failed to persist device list");
        }
        self.reconcile_routes(&devices).await;
    }

    /// Handle one telemetry payload of a device.
    pub async fn process_telemetry(&self, address: &DeviceAddress, payload: &[u8]) {
        let ctx = &self.inner.ctx;
        let telemetry = match Telemetry::from_json(payload) {
            Ok(telemetry) => telemetry,
            Err(err) => {
                tracing::warn!(device = %address, error = %err, "dropping malformed telemetry payload");
                return;
            }
        };
        let device = match ctx
            .registry
            .update_telemetry(address, telemetry.clone())
            .await
        {
            Ok((device, _previous)) => device,
            Err(err) => {
                tracing::warn!(device = %address, error = %err, "telemetry for unknown device");
                return;
            }
        };
        ctx.history.enqueue(TelemetryRecord {
            device: address.clone(),
            recorded_at: greenhub_domain::time::now(),
            payload: String::from_utf8_lossy(payload).into_owned(),
        });
        let fired = ctx.rule_engine.evaluate(&device, &telemetry).await;
        tracing::debug!(
            device = %device.friendly_name,
            scenarios = fired.len(),
            "telemetry processed"
        );
    }

    async fn reconcile_routes(&self, devices: &[Device]) {
        let topics = &self.inner.ctx.topics;
        let wanted: HashMap<&DeviceAddress, String> = devices
            .iter()
            .map(|device| (&device.address, topics.telemetry(&device.friendly_name)))
            .collect();
        let (stale, missing): (Vec<DeviceAddress>, Vec<&Device>) = {
            let routes = self.inner.routes.read().await;
            let stale = routes
                .by_address
                .iter()
                .filter(|(address, route)| wanted.get(address) != Some(&route.topic))
                .map(|(address, _)| address.clone())
                .collect();
            let missing = devices
                .iter()
                .filter(|device| {
                    let topic = wanted.get(&device.address);
                    let routed = routes
                        .by_address
                        .get(&device.address)
                        .is_some_and(|route| Some(&route.topic) == topic);
                    let owned = topic
                        .is_some_and(|topic| routes.by_topic.get(topic) == Some(&device.address));
                    !(routed && owned)
                })
                .collect();
            (stale, missing)
        };
        for address in &stale {
            self.stop_worker(address).await;
        }
        for device in missing {
            self.prepopulate(device).await;
            self.start_worker(device).await;
        }
    }

    async fn prepopulate(&self, device: &Device) {
        if device.telemetry.is_some() {
            return;
        }
        let ctx = &self.inner.ctx;
        match ctx.history_repo.latest(&device.address).await {
            Ok(Some(record)) => match record.snapshot() {
                Ok(snapshot) => {
                    if ctx.registry.seed_telemetry(&device.address, snapshot).await {
                        tracing::debug!(device = %device.friendly_name, "telemetry seeded from history");
                    }
                }
                Err(err) => tracing::warn!(
                    device = %device.friendly_name,
                    error = %err,
                    "stored telemetry is not a JSON object"
                ),
            },
            Ok(None) => {}
            Err(err) => tracing::warn!(
                device = %device.friendly_name,
                error = %err,
                "failed to load latest telemetry"
            ),
        }
    }

    async fn start_worker(&self, device: &Device) {
        let topic = self.inner.ctx.topics.telemetry(&device.friendly_name);
        let (sender, receiver) = mpsc::channel(self.inner.config.device_queue_capacity);
        let token = self.inner.token.child_token();
        {
            let mut routes = self.inner.routes.write().await;
            if let Some(previous) = routes
                .by_topic
                .insert(topic.clone(), device.address.clone())
                && previous != device.address
            {
                tracing::warn!(
                    %topic,
                    device = %device.address,
                    %previous,
                    "telemetry topic claimed by two devices"
                );
            }
            let replaced = routes.by_address.insert(
                device.address.clone(),
                DeviceRoute {
                    topic: topic.clone(),
                    sender,
                    token: token.clone(),
                },
            );
            if let Some(replaced) = replaced {
                replaced.token.cancel();
            }
        }
        {
            let mut workers = self.workers();
            reap_finished(&mut workers);
            workers.spawn(run_device_worker(
                self.clone(),
                device.address.clone(),
                receiver,
                token,
            ));
        }
        if let Err(err) = self.inner.ctx.subscriber.subscribe(&topic).await {
            tracing::warn!(device = %device.friendly_name, %topic, error = %err, "failed to subscribe telemetry topic");
        }
        if self.state() == PipelineState::Subscribed {
            self.set_state(PipelineState::Listening);
        }
    }

    async fn stop_worker(&self, address: &DeviceAddress) {
        let (route, owned) = {
            let mut routes = self.inner.routes.write().await;
            let route = routes.by_address.remove(address);
            let owned = route
                .as_ref()
                .is_some_and(|route| routes.by_topic.get(&route.topic) == Some(address));
            if let Some(route) = &route
                && owned
            {
                routes.by_topic.remove(&route.topic);
            }
            (route, owned)
        };
        let Some(route) = route else {
            return;
        };
        route.token.cancel();
        // the topic now routes to another device
        if !owned {
            return;
        }
        if let Err(err) = self.inner.ctx.subscriber.unsubscribe(&route.topic).await {
            tracing::warn!(device = %address, topic = %route.topic, error = %err, "failed to unsubscribe telemetry topic");
        }
    }

    fn workers(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.inner
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: PipelineState) {
        self.inner.state.send_if_modified(|current| {
            if *current == PipelineState::Stopped || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

fn reap_finished(workers: &mut JoinSet<()>) {
    while let Some(result) = workers.try_join_next() {
        if let Err(err) = result {
            tracing::warn!(error = %err, "pipeline worker ended abnormally");
        }
    }
}

fn warn_dropped<T>(topic: &str, err: &TrySendError<T>) {
    match err {
        TrySendError::Full(_) => tracing::warn!(%topic, "worker queue full, dropping message"),
        TrySendError::Closed(_) => tracing::warn!(%topic, "worker stopped, dropping message"),
    }
}

async fn run_discovery_worker<DR, HR, P, S>(
    pipeline: IngestionPipeline<DR, HR, P, S>,
    mut receiver: mpsc::Receiver<Vec<u8>>,
) where
    DR: DeviceRepository + Send + Sync + 'static,
    HR: TelemetryHistoryRepository + Send + Sync + 'static,
    P: CommandPublisher + 'static,
    S: BusSubscriber + 'static,
{
    let token = pipeline.inner.token.clone();
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            next = receiver.recv() => match next {
                Some(payload) => pipeline.process_discovery(&payload).await,
                None => break,
            },
        }
    }
}

async fn run_device_worker<DR, HR, P, S>(
    pipeline: IngestionPipeline<DR, HR, P, S>,
    address: DeviceAddress,
    mut receiver: mpsc::Receiver<Vec<u8>>,
    token: CancellationToken,
) where
    DR: DeviceRepository + Send + Sync + 'static,
    HR: TelemetryHistoryRepository + Send + Sync + 'static,
    P: CommandPublisher + 'static,
    S: BusSubscriber + 'static,
{
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            next = receiver.recv() => match next {
                Some(payload) => pipeline.process_telemetry(&address, &payload).await,
                None => break,
            },
        }
    }
    tracing::debug!(device = %address, "device worker stopped");
}
