//! Scenario service: keeps the persisted scenarios and the rule engine's
//! working set in step.

use std::sync::Arc;

use greenhub_domain::error::{GreenHubError, NotFoundError};
use greenhub_domain::id::ScenarioId;
use greenhub_domain::scenario::Scenario;

use crate::ports::ScenarioRepository;
use crate::registry::DeviceRegistry;
use crate::rule_engine::ScenarioSet;

/// Application service for scenario CRUD operations.
pub struct ScenarioService<R> {
    repo: Arc<R>,
    scenarios: Arc<ScenarioSet>,
    registry: Arc<DeviceRegistry>,
}

impl<R: ScenarioRepository + Send + Sync> ScenarioService<R> {
    pub fn new(repo: Arc<R>, scenarios: Arc<ScenarioSet>, registry: Arc<DeviceRegistry>) -> Self {
        Self {
            repo,
            scenarios,
            registry,
        }
    }

    /// Replace the working set with every persisted scenario.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn load(&self) -> Result<usize, GreenHubError> {
        let all = self.repo.get_all().await?;
        let count = all.len();
        self.scenarios.replace_all(all).await;
        tracing::info!(count, "scenarios loaded");
        Ok(count)
    }

    /// Persist a new scenario and start evaluating it.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::Validation`] if invariants fail,
    /// [`GreenHubError::NotFound`] if the source device is unknown, or a
    /// storage error.
    #[tracing::instrument(skip(self, scenario), fields(source = %scenario.source, property = %scenario.property))]
    pub async fn create_scenario(&self, scenario: Scenario) -> Result<Scenario, GreenHubError> {
        scenario.validate()?;
        if !self.registry.contains(&scenario.source).await {
            return Err(NotFoundError {
                entity: "Device",
                id: scenario.source.to_string(),
            }
            .into());
        }
        let created = self.repo.create(scenario).await?;
        self.scenarios.insert(created.clone()).await;
        tracing::info!(scenario_id = %created.id, "scenario created");
        Ok(created)
    }

    /// List every scenario of the working set, ordered by id.
    pub async fn list_scenarios(&self) -> Vec<Scenario> {
        self.scenarios.list().await
    }

    /// Delete a scenario from storage and from the working set.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::NotFound`] when the id is unknown to both,
    /// or a storage error (in which case the working set is left untouched).
    #[tracing::instrument(skip(self))]
    pub async fn delete_scenario(&self, id: ScenarioId) -> Result<(), GreenHubError> {
        let deleted = self.repo.delete(id).await?;
        let removed = self.scenarios.remove(id).await;
        if !deleted && !removed {
            return Err(NotFoundError {
                entity: "Scenario",
                id: id.to_string(),
            }
            .into());
        }
        tracing::info!(scenario_id = %id, "scenario deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryScenarioRepo, descriptor};
    use greenhub_domain::error::ValidationError;
    use greenhub_domain::scenario::Operator;
    use serde_json::json;

    async fn make_service() -> (ScenarioService<InMemoryScenarioRepo>, Arc<ScenarioSet>) {
        let registry = Arc::new(DeviceRegistry::new());
        registry
            .upsert_devices(&[descriptor("0x01", "plant-sensor-1")])
            .await;
        let set = Arc::new(ScenarioSet::new());
        let svc = ScenarioService::new(
            Arc::new(InMemoryScenarioRepo::default()),
            Arc::clone(&set),
            registry,
        );
        (svc, set)
    }

    fn irrigation(source: &str) -> Scenario {
        Scenario::builder()
            .source(source)
            .property("soil_moisture")
            .operator(Operator::Lt)
            .comparison_value("20")
            .target_topic("zigbee2mqtt/valve-1/set")
            .action("state", json!("ON"))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn should_create_scenario_and_add_to_working_set() {
        let (svc, set) = make_service().await;
        let created = svc.create_scenario(irrigation("0x01")).await.unwrap();
        assert_eq!(created.id, ScenarioId::new(1));
        assert_eq!(set.len().await, 1);
        assert_eq!(svc.list_scenarios().await, vec![created]);
    }

    #[tokio::test]
    async fn should_reject_scenario_for_unknown_source() {
        let (svc, set) = make_service().await;
        let result = svc.create_scenario(irrigation("0x99")).await;
        assert!(matches!(result, Err(GreenHubError::NotFound(_))));
        assert!(set.is_empty().await);
    }

    #[tokio::test]
    async fn should_reject_invalid_scenario() {
        let (svc, _) = make_service().await;
        let mut scenario = irrigation("0x01");
        scenario.action_payload.clear();
        let result = svc.create_scenario(scenario).await;
        assert!(matches!(
            result,
            Err(GreenHubError::Validation(ValidationError::EmptyPayload))
        ));
    }

    #[tokio::test]
    async fn should_remove_deleted_scenario_from_working_set() {
        let (svc, set) = make_service().await;
        let created = svc.create_scenario(irrigation("0x01")).await.unwrap();

        svc.delete_scenario(created.id).await.unwrap();

        assert!(set.is_empty().await);
        assert!(svc.list_scenarios().await.is_empty());
    }

    #[tokio::test]
    async fn should_return_not_found_when_deleting_unknown_scenario() {
        let (svc, _) = make_service().await;
        let result = svc.delete_scenario(ScenarioId::new(42)).await;
        assert!(matches!(result, Err(GreenHubError::NotFound(_))));
    }

    #[tokio::test]
    async fn should_load_persisted_scenarios_into_working_set() {
        let repo = Arc::new(InMemoryScenarioRepo::default());
        repo.create(irrigation("0x01")).await.unwrap();
        repo.create(irrigation("0x02")).await.unwrap();
        let set = Arc::new(ScenarioSet::new());
        let svc = ScenarioService::new(repo, Arc::clone(&set), Arc::new(DeviceRegistry::new()));

        assert_eq!(svc.load().await.unwrap(), 2);
        assert_eq!(set.len().await, 2);
    }
}
