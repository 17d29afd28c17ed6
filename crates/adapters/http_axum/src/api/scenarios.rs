//! JSON handlers for scenarios.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use greenhub_app::ports::{
    CommandPublisher, ScenarioRepository, ScheduleRepository, TelemetryHistoryRepository,
};
use greenhub_domain::id::ScenarioId;
use greenhub_domain::scenario::{Operator, Scenario};
use greenhub_domain::telemetry::Properties;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for creating a scenario.
#[derive(Deserialize)]
pub struct CreateScenarioRequest {
    /// Hardware address of the source device.
    pub source: String,
    pub property: String,
    pub operator: String,
    pub value: String,
    pub target_topic: String,
    pub payload: Properties,
}

pub enum ListResponse {
    Ok(Json<Vec<Scenario>>),
}

impl IntoResponse for ListResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

pub enum CreateResponse {
    Created(Json<Scenario>),
}

impl IntoResponse for CreateResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Created(json) => (StatusCode::CREATED, json).into_response(),
        }
    }
}

pub enum DeleteResponse {
    NoContent,
}

impl IntoResponse for DeleteResponse {
    fn into_response(self) -> Response {
        match self {
            Self::NoContent => StatusCode::NO_CONTENT.into_response(),
        }
    }
}

/// `GET /api/scenarios`
pub async fn list<HR, P, SR, SCR>(
    State(state): State<AppState<HR, P, SR, SCR>>,
) -> Result<ListResponse, ApiError>
where
    HR: TelemetryHistoryRepository + Send + Sync + 'static,
    P: CommandPublisher + 'static,
    SR: ScenarioRepository + Send + Sync + 'static,
    SCR: ScheduleRepository + Send + Sync + 'static,
{
    let scenarios = state.scenario_service.list_scenarios().await;
    Ok(ListResponse::Ok(Json(scenarios)))
}

/// `POST /api/scenarios`
pub async fn create<HR, P, SR, SCR>(
    State(state): State<AppState<HR, P, SR, SCR>>,
    Json(req): Json<CreateScenarioRequest>,
) -> Result<CreateResponse, ApiError>
where
    HR: TelemetryHistoryRepository + Send + Sync + 'static,
    P: CommandPublisher + 'static,
    SR: ScenarioRepository + Send + Sync + 'static,
    SCR: ScheduleRepository + Send + Sync + 'static,
{
    let operator: Operator = req.operator.parse()?;
    let scenario = Scenario::builder()
        .source(req.source.as_str())
        .property(req.property)
        .operator(operator)
        .comparison_value(req.value)
        .target_topic(req.target_topic)
        .action_payload(req.payload)
        .build()?;
    let created = state.scenario_service.create_scenario(scenario).await?;
    Ok(CreateResponse::Created(Json(created)))
}

/// `DELETE /api/scenarios/{id}`
pub async fn delete<HR, P, SR, SCR>(
    State(state): State<AppState<HR, P, SR, SCR>>,
    Path(id): Path<String>,
) -> Result<DeleteResponse, ApiError>
where
    HR: TelemetryHistoryRepository + Send + Sync + 'static,
    P: CommandPublisher + 'static,
    SR: ScenarioRepository + Send + Sync + 'static,
    SCR: ScheduleRepository + Send + Sync + 'static,
{
    let id: ScenarioId = id.parse()?;
    state.scenario_service.delete_scenario(id).await?;
    Ok(DeleteResponse::NoContent)
}
