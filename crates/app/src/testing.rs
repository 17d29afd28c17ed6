//! In-memory fakes of the ports, shared by the unit tests of this crate.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use tokio::sync::Semaphore;

use greenhub_domain::device::{Access, Definition, Device, DeviceDescriptor, Expose};
use greenhub_domain::error::GreenHubError;
use greenhub_domain::id::{DeviceAddress, ScenarioId, ScheduleId};
use greenhub_domain::scenario::Scenario;
use greenhub_domain::schedule::Schedule;
use greenhub_domain::telemetry::{Properties, TelemetryRecord};

use crate::ports::{
    BusSubscriber, CommandPublisher, DeviceRepository, ScenarioRepository, ScheduleRepository,
    TelemetryHistoryRepository,
};

pub(crate) fn descriptor(address: &str, name: &str) -> DeviceDescriptor {
    DeviceDescriptor {
        ieee_address: DeviceAddress::new(address),
        friendly_name: name.to_string(),
        kind: "EndDevice".to_string(),
        manufacturer: Some("Xiaomi".to_string()),
        model_id: Some("lumi.flora".to_string()),
        definition: Some(Definition {
            description: "Plant sensor".to_string(),
            exposes: vec![
                Expose {
                    kind: "numeric".to_string(),
                    name: "soil_moisture".to_string(),
                    property: Some("soil_moisture".to_string()),
                    access: Access::PUBLISHED,
                    ..Expose::default()
                },
                Expose {
                    kind: "binary".to_string(),
                    name: "state".to_string(),
                    property: Some("state".to_string()),
                    access: Access::from(7),
                    ..Expose::default()
                },
            ],
        }),
    }
}

pub(crate) fn props(value: serde_json::Value) -> Properties {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

fn storage_down() -> GreenHubError {
    GreenHubError::Storage("storage is down".into())
}

#[derive(Default)]
pub(crate) struct InMemoryDeviceRepo {
    store: Mutex<BTreeMap<DeviceAddress, Device>>,
    pub(crate) fail: AtomicBool,
}

impl InMemoryDeviceRepo {
    pub(crate) fn stored(&self) -> Vec<Device> {
        self.store.lock().unwrap().values().cloned().collect()
    }
}

impl DeviceRepository for InMemoryDeviceRepo {
    fn upsert_all(
        &self,
        devices: Vec<Device>,
    ) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        let result = if self.fail.load(Ordering::SeqCst) {
            Err(storage_down())
        } else {
            let mut store = self.store.lock().unwrap();
            for device in devices {
                store.insert(device.address.clone(), device);
            }
            Ok(())
        };
        async { result }
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<Device>, GreenHubError>> + Send {
        let result = self.stored();
        async { Ok(result) }
    }
}

#[derive(Default)]
pub(crate) struct InMemoryHistoryRepo {
    records: Mutex<Vec<TelemetryRecord>>,
    attempts: AtomicUsize,
    pub(crate) fail: AtomicBool,
}

impl InMemoryHistoryRepo {
    pub(crate) fn with_records(records: Vec<TelemetryRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            attempts: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub(crate) fn stored(&self) -> Vec<TelemetryRecord> {
        self.records.lock().unwrap().clone()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl TelemetryHistoryRepository for InMemoryHistoryRepo {
    fn record(
        &self,
        record: TelemetryRecord,
    ) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail.load(Ordering::SeqCst) {
            Err(storage_down())
        } else {
            self.records.lock().unwrap().push(record);
            Ok(())
        };
        async { result }
    }

    fn latest(
        &self,
        device: &DeviceAddress,
    ) -> impl Future<Output = Result<Option<TelemetryRecord>, GreenHubError>> + Send {
        let result = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| &r.device == device)
            .max_by_key(|r| r.recorded_at)
            .cloned();
        async { Ok(result) }
    }

    fn recent(
        &self,
        device: &DeviceAddress,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<TelemetryRecord>, GreenHubError>> + Send {
        let mut result: Vec<TelemetryRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| &r.device == device)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        result.truncate(limit);
        async { Ok(result) }
    }
}

#[derive(Default)]
pub(crate) struct InMemoryScenarioRepo {
    store: Mutex<BTreeMap<ScenarioId, Scenario>>,
    next_id: AtomicI64,
}

impl ScenarioRepository for InMemoryScenarioRepo {
    fn create(
        &self,
        scenario: Scenario,
    ) -> impl Future<Output = Result<Scenario, GreenHubError>> + Send {
        let id = ScenarioId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let scenario = scenario.with_id(id);
        self.store.lock().unwrap().insert(id, scenario.clone());
        async { Ok(scenario) }
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<Scenario>, GreenHubError>> + Send {
        let result: Vec<Scenario> = self.store.lock().unwrap().values().cloned().collect();
        async { Ok(result) }
    }

    fn delete(&self, id: ScenarioId) -> impl Future<Output = Result<bool, GreenHubError>> + Send {
        let existed = self.store.lock().unwrap().remove(&id).is_some();
        async move { Ok(existed) }
    }
}

#[derive(Default)]
pub(crate) struct InMemoryScheduleRepo {
    store: Mutex<BTreeMap<ScheduleId, Schedule>>,
    next_id: AtomicI64,
    pub(crate) fail_delete: AtomicBool,
}

impl ScheduleRepository for InMemoryScheduleRepo {
    fn create(
        &self,
        schedule: Schedule,
    ) -> impl Future<Output = Result<Schedule, GreenHubError>> + Send {
        let id = ScheduleId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let schedule = schedule.with_id(id);
        self.store.lock().unwrap().insert(id, schedule.clone());
        async { Ok(schedule) }
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<Schedule>, GreenHubError>> + Send {
        let result: Vec<Schedule> = self.store.lock().unwrap().values().cloned().collect();
        async { Ok(result) }
    }

    fn delete(&self, id: ScheduleId) -> impl Future<Output = Result<bool, GreenHubError>> + Send {
        let result = if self.fail_delete.load(Ordering::SeqCst) {
            Err(storage_down())
        } else {
            Ok(self.store.lock().unwrap().remove(&id).is_some())
        };
        async { result }
    }
}

/// Records every publish; optionally fails them all, or parks the ones
/// sent to a held topic until [`SpyPublisher::release`] is called.
pub(crate) struct SpyPublisher {
    sent: Mutex<Vec<(String, Properties)>>,
    pub(crate) fail: AtomicBool,
    held_topic: Mutex<Option<String>>,
    parked: AtomicUsize,
    gate: Semaphore,
}

impl Default for SpyPublisher {
    fn default() -> Self {
        Self {
            sent: Mutex::default(),
            fail: AtomicBool::new(false),
            held_topic: Mutex::default(),
            parked: AtomicUsize::new(0),
            gate: Semaphore::new(0),
        }
    }
}

impl SpyPublisher {
    pub(crate) fn published(&self) -> Vec<(String, Properties)> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn hold(&self, topic: &str) {
        *self.held_topic.lock().unwrap() = Some(topic.to_string());
    }

    /// Number of publishes currently waiting on the held topic.
    pub(crate) fn parked(&self) -> usize {
        self.parked.load(Ordering::SeqCst)
    }

    pub(crate) fn release(&self) {
        self.held_topic.lock().unwrap().take();
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    fn is_held(&self, topic: &str) -> bool {
        self.held_topic.lock().unwrap().as_deref() == Some(topic)
    }
}

impl CommandPublisher for SpyPublisher {
    fn publish(
        &self,
        topic: &str,
        payload: &Properties,
    ) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        let topic = topic.to_string();
        let payload = payload.clone();
        async move {
            if self.fail.load(Ordering::SeqCst) {
                return Err(GreenHubError::Bus("broker unreachable".into()));
            }
            if self.is_held(&topic) {
                self.parked.fetch_add(1, Ordering::SeqCst);
                let _permit = self.gate.acquire().await;
                self.parked.fetch_sub(1, Ordering::SeqCst);
            }
            self.sent.lock().unwrap().push((topic, payload));
            Ok(())
        }
    }
}

/// Tracks active subscriptions and counts subscribe calls per topic.
#[derive(Default)]
pub(crate) struct SpySubscriber {
    active: Mutex<BTreeSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl SpySubscriber {
    pub(crate) fn active(&self) -> Vec<String> {
        self.active.lock().unwrap().iter().cloned().collect()
    }

    pub(crate) fn subscribe_calls(&self, topic: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|t| *t == topic).count()
    }
}

impl BusSubscriber for SpySubscriber {
    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        self.active.lock().unwrap().insert(topic.to_string());
        self.calls.lock().unwrap().push(topic.to_string());
        async { Ok(()) }
    }

    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        self.active.lock().unwrap().remove(topic);
        async { Ok(()) }
    }
}
