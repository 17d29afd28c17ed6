//! Axum router assembly.

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use greenhub_app::ports::{
    CommandPublisher, ScenarioRepository, ScheduleRepository, TelemetryHistoryRepository,
};

use crate::state::AppState;

/// Build the top-level axum [`Router`].
///
/// Nests API routes under `/api` and includes a [`TraceLayer`] that logs
/// each HTTP request/response at the `DEBUG` level using the `tracing`
/// ecosystem.
pub fn build<HR, P, SR, SCR>(state: AppState<HR, P, SR, SCR>) -> Router
where
    HR: TelemetryHistoryRepository + Send + Sync + 'static,
    P: CommandPublisher + 'static,
    SR: ScenarioRepository + Send + Sync + 'static,
    SCR: ScheduleRepository + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", crate::api::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use greenhub_app::registry::DeviceRegistry;
    use greenhub_app::rule_engine::ScenarioSet;
    use greenhub_app::scheduler::Scheduler;
    use greenhub_app::services::device_service::DeviceService;
    use greenhub_app::services::scenario_service::ScenarioService;
    use greenhub_app::services::schedule_service::ScheduleService;
    use greenhub_domain::device::{Definition, DeviceDescriptor};
    use greenhub_domain::error::GreenHubError;
    use greenhub_domain::id::{DeviceAddress, ScenarioId, ScheduleId};
    use greenhub_domain::scenario::Scenario;
    use greenhub_domain::schedule::Schedule;
    use greenhub_domain::telemetry::{Properties, TelemetryRecord};
    use greenhub_domain::topic::Topics;
    use http_body_util::BodyExt;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    struct StubHistoryRepo;
    #[derive(Default)]
    struct StubScenarioRepo;
    struct StubScheduleRepo;
    #[derive(Default)]
    struct StubPublisher {
        published: Mutex<Vec<(String, Properties)>>,
    }

    impl TelemetryHistoryRepository for StubHistoryRepo {
        async fn record(&self, _record: TelemetryRecord) -> Result<(), GreenHubError> {
            Ok(())
        }
        async fn latest(
            &self,
            _device: &DeviceAddress,
        ) -> Result<Option<TelemetryRecord>, GreenHubError> {
            Ok(None)
        }
        async fn recent(
            &self,
            _device: &DeviceAddress,
            _limit: usize,
        ) -> Result<Vec<TelemetryRecord>, GreenHubError> {
            Ok(vec![])
        }
    }

    impl ScenarioRepository for StubScenarioRepo {
        async fn create(&self, scenario: Scenario) -> Result<Scenario, GreenHubError> {
            Ok(scenario.with_id(ScenarioId::new(1)))
        }
        async fn get_all(&self) -> Result<Vec<Scenario>, GreenHubError> {
            Ok(vec![])
        }
        async fn delete(&self, _id: ScenarioId) -> Result<bool, GreenHubError> {
            Ok(false)
        }
    }

    impl ScheduleRepository for StubScheduleRepo {
        async fn create(&self, schedule: Schedule) -> Result<Schedule, GreenHubError> {
            Ok(schedule.with_id(ScheduleId::new(1)))
        }
        async fn get_all(&self) -> Result<Vec<Schedule>, GreenHubError> {
            Ok(vec![])
        }
        async fn delete(&self, _id: ScheduleId) -> Result<bool, GreenHubError> {
            Ok(false)
        }
    }

    impl CommandPublisher for StubPublisher {
        async fn publish(&self, topic: &str, payload: &Properties) -> Result<(), GreenHubError> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.clone()));
            Ok(())
        }
    }

    type TestState = AppState<StubHistoryRepo, StubPublisher, StubScenarioRepo, StubScheduleRepo>;

    async fn test_state() -> (TestState, Arc<StubPublisher>) {
        let registry = Arc::new(DeviceRegistry::new());
        registry
            .upsert_devices(&[DeviceDescriptor {
                ieee_address: DeviceAddress::new("0x02"),
                friendly_name: "valve-1".to_string(),
                kind: "Router".to_string(),
                manufacturer: None,
                model_id: None,
                definition: Some(Definition::default()),
            }])
            .await;
        let publisher = Arc::new(StubPublisher::default());
        let topics = Topics::default();
        let scheduler = Scheduler::new(
            Arc::clone(&publisher),
            Arc::clone(&registry),
            topics.clone(),
            CancellationToken::new(),
        );
        let state = AppState::new(
            DeviceService::new(
                Arc::clone(&registry),
                Arc::new(StubHistoryRepo),
                Arc::clone(&publisher),
                topics,
            ),
            ScenarioService::new(
                Arc::new(StubScenarioRepo),
                Arc::new(ScenarioSet::new()),
                Arc::clone(&registry),
            ),
            ScheduleService::new(Arc::new(StubScheduleRepo), scheduler, registry),
        );
        (state, publisher)
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, String) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn should_return_ok_when_health_check_called() {
        let (state, _) = test_state().await;
        let (status, body) = send(build(state), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn should_list_known_devices() {
        let (state, _) = test_state().await;
        let (status, body) = send(build(state), "GET", "/api/devices", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#""friendly_name":"valve-1""#));
    }

    #[tokio::test]
    async fn should_return_not_found_for_unknown_device() {
        let (state, _) = test_state().await;
        let (status, body) = send(build(state), "GET", "/api/devices/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("error"));
    }

    #[tokio::test]
    async fn should_publish_device_action() {
        let (state, publisher) = test_state().await;
        let (status, _) = send(
            build(state),
            "POST",
            "/api/devices/valve-1/actions",
            Some(r#"{"property": "state", "value": "ON"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "zigbee2mqtt/valve-1/set");
    }

    #[tokio::test]
    async fn should_open_permit_join_without_body() {
        let (state, publisher) = test_state().await;
        let (status, body) = send(build(state), "POST", "/api/permit-join", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, r#"{"time":50}"#);
        assert_eq!(
            publisher.published.lock().unwrap()[0].0,
            "zigbee2mqtt/bridge/request/permit_join"
        );
    }

    #[tokio::test]
    async fn should_reject_scenario_with_unknown_operator() {
        let (state, _) = test_state().await;
        let (status, _) = send(
            build(state),
            "POST",
            "/api/scenarios",
            Some(
                r#"{"source": "0x02", "property": "state", "operator": "~",
                    "value": "ON", "target_topic": "zigbee2mqtt/valve-1/set",
                    "payload": {"state": "OFF"}}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn should_create_scenario() {
        let (state, _) = test_state().await;
        let (status, body) = send(
            build(state),
            "POST",
            "/api/scenarios",
            Some(
                r#"{"source": "0x02", "property": "state", "operator": "==",
                    "value": "ON", "target_topic": "zigbee2mqtt/valve-1/set",
                    "payload": {"state": "OFF"}}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body.contains(r#""id":1"#));
    }

    #[tokio::test]
    async fn should_reject_non_numeric_scenario_id() {
        let (state, _) = test_state().await;
        let (status, _) = send(build(state), "DELETE", "/api/scenarios/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn should_return_not_found_when_deleting_unknown_schedule() {
        let (state, _) = test_state().await;
        let (status, _) = send(build(state), "DELETE", "/api/schedules/7", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn should_reject_schedule_with_bad_trigger_time() {
        let (state, _) = test_state().await;
        let (status, body) = send(
            build(state),
            "POST",
            "/api/schedules",
            Some(r#"{"device": "0x02", "property": "state", "value": "ON", "trigger_at": "soon"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("soon"));
    }

    #[tokio::test]
    async fn should_create_schedule_with_cron_view() {
        let (state, _) = test_state().await;
        let (status, body) = send(
            build(state),
            "POST",
            "/api/schedules",
            Some(
                r#"{"device": "0x02", "property": "state", "value": "ON",
                    "trigger_at": "2999-05-01T06:30:00Z", "recurrence": "daily"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body.contains(r#""recurrence":"daily""#));
        assert!(body.contains(r#""cron":"#));
    }
}
