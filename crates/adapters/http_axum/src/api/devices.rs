//! JSON handlers for devices, device commands, and pairing.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use greenhub_app::ports::{
    CommandPublisher, ScenarioRepository, ScheduleRepository, TelemetryHistoryRepository,
};
use greenhub_domain::chart::ChartPoint;
use greenhub_domain::device::Device;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for sending a command to a device.
#[derive(Deserialize)]
pub struct ActionRequest {
    pub property: String,
    pub value: Value,
}

/// Query string of the chart endpoint.
#[derive(Deserialize)]
pub struct ChartQuery {
    pub limit: Option<usize>,
}

/// Request and response body of the permit-join endpoint.
#[derive(Deserialize, Serialize, Default)]
pub struct PermitJoin {
    pub time: Option<u64>,
}

/// Possible responses from the list endpoint.
pub enum ListResponse {
    Ok(Json<Vec<Device>>),
}

impl IntoResponse for ListResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// Possible responses from the get endpoint.
pub enum GetResponse {
    Ok(Json<Device>),
}

impl IntoResponse for GetResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// Possible responses from the command endpoints.
pub enum AcceptedResponse {
    Accepted,
    AcceptedWith(Json<PermitJoin>),
}

impl IntoResponse for AcceptedResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Accepted => StatusCode::ACCEPTED.into_response(),
            Self::AcceptedWith(json) => (StatusCode::ACCEPTED, json).into_response(),
        }
    }
}

/// `GET /api/devices`
pub async fn list<HR, P, SR, SCR>(
    State(state): State<AppState<HR, P, SR, SCR>>,
) -> Result<ListResponse, ApiError>
where
    HR: TelemetryHistoryRepository + Send + Sync + 'static,
    P: CommandPublisher + 'static,
    SR: ScenarioRepository + Send + Sync + 'static,
    SCR: ScheduleRepository + Send + Sync + 'static,
{
    let devices = state.device_service.list_devices().await;
    Ok(ListResponse::Ok(Json(devices)))
}

/// `GET /api/devices/{name}`
pub async fn get<HR, P, SR, SCR>(
    State(state): State<AppState<HR, P, SR, SCR>>,
    Path(name): Path<String>,
) -> Result<GetResponse, ApiError>
where
    HR: TelemetryHistoryRepository + Send + Sync + 'static,
    P: CommandPublisher + 'static,
    SR: ScenarioRepository + Send + Sync + 'static,
    SCR: ScheduleRepository + Send + Sync + 'static,
{
    let device = state.device_service.get_device(&name).await?;
    Ok(GetResponse::Ok(Json(device)))
}

/// `POST /api/devices/{name}/actions`
pub async fn action<HR, P, SR, SCR>(
    State(state): State<AppState<HR, P, SR, SCR>>,
    Path(name): Path<String>,
    Json(req): Json<ActionRequest>,
) -> Result<AcceptedResponse, ApiError>
where
    HR: TelemetryHistoryRepository + Send + Sync + 'static,
    P: CommandPublisher + 'static,
    SR: ScenarioRepository + Send + Sync + 'static,
    SCR: ScheduleRepository + Send + Sync + 'static,
{
    state
        .device_service
        .device_action(&name, &req.property, req.value)
        .await?;
    Ok(AcceptedResponse::Accepted)
}

/// `GET /api/devices/{name}/chart/{property}?limit=N`
pub async fn chart<HR, P, SR, SCR>(
    State(state): State<AppState<HR, P, SR, SCR>>,
    Path((name, property)): Path<(String, String)>,
    Query(query): Query<ChartQuery>,
) -> Result<Json<Vec<ChartPoint>>, ApiError>
where
    HR: TelemetryHistoryRepository + Send + Sync + 'static,
    P: CommandPublisher + 'static,
    SR: ScenarioRepository + Send + Sync + 'static,
    SCR: ScheduleRepository + Send + Sync + 'static,
{
    let points = state
        .device_service
        .chart_series(&name, &property, query.limit)
        .await?;
    Ok(Json(points))
}

/// `POST /api/permit-join`: open the pairing window of the bridge.
pub async fn permit_join<HR, P, SR, SCR>(
    State(state): State<AppState<HR, P, SR, SCR>>,
    body: Option<Json<PermitJoin>>,
) -> Result<AcceptedResponse, ApiError>
where
    HR: TelemetryHistoryRepository + Send + Sync + 'static,
    P: CommandPublisher + 'static,
    SR: ScenarioRepository + Send + Sync + 'static,
    SCR: ScheduleRepository + Send + Sync + 'static,
{
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let secs = state.device_service.permit_join(req.time).await?;
    Ok(AcceptedResponse::AcceptedWith(Json(PermitJoin {
        time: Some(secs),
    })))
}
