//! Rule engine: evaluates scenarios against fresh telemetry.
//!
//! The scenario working set is a cache of the persisted scenarios, indexed
//! by source device address. Evaluation clones the relevant scenarios and
//! releases the lock before publishing, so the engine can run concurrently
//! for different devices.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use greenhub_domain::device::Device;
use greenhub_domain::id::{DeviceAddress, ScenarioId};
use greenhub_domain::scenario::Scenario;
use greenhub_domain::telemetry::Telemetry;

use crate::ports::CommandPublisher;

/// In-memory working set of scenarios, keyed by source device.
#[derive(Debug, Default)]
pub struct ScenarioSet {
    by_source: RwLock<HashMap<DeviceAddress, Vec<Scenario>>>,
}

impl ScenarioSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole working set.
    pub async fn replace_all(&self, scenarios: Vec<Scenario>) {
        let mut index: HashMap<DeviceAddress, Vec<Scenario>> = HashMap::new();
        for scenario in scenarios {
            index
                .entry(scenario.source.clone())
                .or_default()
                .push(scenario);
        }
        *self.by_source.write().await = index;
    }

    pub async fn insert(&self, scenario: Scenario) {
        let mut index = self.by_source.write().await;
        let bucket = index.entry(scenario.source.clone()).or_default();
        bucket.retain(|existing| existing.id != scenario.id);
        bucket.push(scenario);
    }

    /// Remove a scenario, returning whether it was present.
    pub async fn remove(&self, id: ScenarioId) -> bool {
        let mut index = self.by_source.write().await;
        let mut removed = false;
        for bucket in index.values_mut() {
            let before = bucket.len();
            bucket.retain(|scenario| scenario.id != id);
            removed |= bucket.len() != before;
        }
        index.retain(|_, bucket| !bucket.is_empty());
        removed
    }

    /// Scenarios watching the given source device.
    pub async fn for_source(&self, source: &DeviceAddress) -> Vec<Scenario> {
        self.by_source
            .read()
            .await
            .get(source)
            .cloned()
            .unwrap_or_default()
    }

    /// Every scenario, ordered by id.
    pub async fn list(&self) -> Vec<Scenario> {
        let mut all: Vec<Scenario> = self
            .by_source
            .read()
            .await
            .values()
            .flatten()
            .cloned()
            .collect();
        all.sort_by_key(|scenario| scenario.id);
        all
    }

    pub async fn len(&self) -> usize {
        self.by_source.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Stateless evaluator publishing scenario actions.
pub struct RuleEngine<P> {
    scenarios: Arc<ScenarioSet>,
    publisher: Arc<P>,
}

impl<P: CommandPublisher> RuleEngine<P> {
    pub fn new(scenarios: Arc<ScenarioSet>, publisher: Arc<P>) -> Self {
        Self {
            scenarios,
            publisher,
        }
    }

    /// Evaluate every scenario sourced from `device` against `telemetry`.
    ///
    /// A matching scenario publishes its action payload to its target topic
    /// unless the report already shows the action's effect. A failed publish
    /// is logged and evaluation continues. Returns the ids of the scenarios
    /// whose action was published.
    pub async fn evaluate(&self, device: &Device, telemetry: &Telemetry) -> Vec<ScenarioId> {
        let candidates = self.scenarios.for_source(&device.address).await;
        let mut fired = Vec::new();
        for scenario in &candidates {
            if !scenario.condition_holds(telemetry) {
                continue;
            }
            if scenario.is_already_applied(telemetry) {
                tracing::debug!(
                    scenario_id = %scenario.id,
                    device = %device.friendly_name,
                    "scenario effect already observed, skipping"
                );
                continue;
            }
            match self
                .publisher
                .publish(&scenario.target_topic, &scenario.action_payload)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        scenario_id = %scenario.id,
                        device = %device.friendly_name,
                        topic = %scenario.target_topic,
                        "scenario triggered"
                    );
                    fired.push(scenario.id);
                }
                Err(err) => {
                    tracing::warn!(
                        scenario_id = %scenario.id,
                        device = %device.friendly_name,
                        topic = %scenario.target_topic,
                        error = %err,
                        "failed to publish scenario action"
                    );
                }
            }
        }
        fired
    }
}
