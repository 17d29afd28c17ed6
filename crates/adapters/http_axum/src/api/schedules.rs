//! JSON handlers for schedules.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use greenhub_app::ports::{
    CommandPublisher, ScenarioRepository, ScheduleRepository, TelemetryHistoryRepository,
};
use greenhub_domain::id::{DeviceAddress, ScheduleId};
use greenhub_domain::schedule::{Recurrence, Schedule};
use greenhub_domain::time::parse_trigger_time;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for creating a schedule.
#[derive(Deserialize)]
pub struct CreateScheduleRequest {
    /// Hardware address of the target device.
    pub device: String,
    pub property: String,
    pub value: Value,
    /// RFC 3339, or `YYYY-MM-DDTHH:MM` in local time.
    pub trigger_at: String,
    #[serde(default)]
    pub recurrence: String,
}

/// A schedule as shown on the dashboard.
#[derive(Serialize)]
pub struct ScheduleView {
    #[serde(flatten)]
    pub schedule: Schedule,
    /// Legacy `m h dom mon *` form of the trigger time.
    pub cron: String,
}

impl From<Schedule> for ScheduleView {
    fn from(schedule: Schedule) -> Self {
        let cron = schedule.cron_expression();
        Self { schedule, cron }
    }
}

pub enum ListResponse {
    Ok(Json<Vec<ScheduleView>>),
}

impl IntoResponse for ListResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

pub enum CreateResponse {
    Created(Json<ScheduleView>),
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

/// `GET /api/schedules`
pub async fn list<HR, P, SR, SCR>(
    State(state): State<AppState<HR, P, SR, SCR>>,
) -> Result<ListResponse, ApiError>
where
    HR: TelemetryHistoryRepository + Send + Sync + 'static,
    P: CommandPublisher + 'static,
    SR: ScenarioRepository + Send + Sync + 'static,
    SCR: ScheduleRepository + Send + Sync + 'static,
{
    let schedules = state.schedule_service.list_schedules().await?;
    Ok(ListResponse::Ok(Json(
        schedules.into_iter().map(ScheduleView::from).collect(),
    )))
}

/// `POST /api/schedules`
pub async fn create<HR, P, SR, SCR>(
    State(state): State<AppState<HR, P, SR, SCR>>,
    Json(req): Json<CreateScheduleRequest>,
) -> Result<CreateResponse, ApiError>
where
    HR: TelemetryHistoryRepository + Send + Sync + 'static,
    P: CommandPublisher + 'static,
    SR: ScenarioRepository + Send + Sync + 'static,
    SCR: ScheduleRepository + Send + Sync + 'static,
{
    let trigger_at = parse_trigger_time(&req.trigger_at)?;
    let recurrence: Recurrence = req.recurrence.parse()?;
    let schedule = Schedule::new(
        DeviceAddress::new(req.device),
        req.property,
        req.value,
        trigger_at,
        recurrence,
    );
    let created = state.schedule_service.create_schedule(schedule).await?;
    Ok(CreateResponse::Created(Json(created.into())))
}

/// `DELETE /api/schedules/{id}`
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
    let id: ScheduleId = id.parse()?;
    state.schedule_service.delete_schedule(id).await?;
    Ok(DeleteResponse::NoContent)
}
