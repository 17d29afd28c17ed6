//! JSON API handler modules.

#[allow(clippy::missing_errors_doc)]
pub mod devices;
#[allow(clippy::missing_errors_doc)]
pub mod scenarios;
#[allow(clippy::missing_errors_doc)]
pub mod schedules;

use axum::Router;
use axum::routing::{delete, get, post};

use greenhub_app::ports::{
    CommandPublisher, ScenarioRepository, ScheduleRepository, TelemetryHistoryRepository,
};

use crate::state::AppState;

/// Build the `/api` sub-router.
pub fn routes<HR, P, SR, SCR>() -> Router<AppState<HR, P, SR, SCR>>
where
    HR: TelemetryHistoryRepository + Send + Sync + 'static,
    P: CommandPublisher + 'static,
    SR: ScenarioRepository + Send + Sync + 'static,
    SCR: ScheduleRepository + Send + Sync + 'static,
{
    Router::new()
        // Devices
        .route("/devices", get(devices::list::<HR, P, SR, SCR>))
        .route("/devices/{name}", get(devices::get::<HR, P, SR, SCR>))
        .route(
            "/devices/{name}/actions",
            post(devices::action::<HR, P, SR, SCR>),
        )
        .route(
            "/devices/{name}/chart/{property}",
            get(devices::chart::<HR, P, SR, SCR>),
        )
        .route("/permit-join", post(devices::permit_join::<HR, P, SR, SCR>))
        // Scenarios
        .route(
            "/scenarios",
            get(scenarios::list::<HR, P, SR, SCR>).post(scenarios::create::<HR, P, SR, SCR>),
        )
        .route(
            "/scenarios/{id}",
            delete(scenarios::delete::<HR, P, SR, SCR>),
        )
        // Schedules
        .route(
            "/schedules",
            get(schedules::list::<HR, P, SR, SCR>).post(schedules::create::<HR, P, SR, SCR>),
        )
        .route(
            "/schedules/{id}",
            delete(schedules::delete::<HR, P, SR, SCR>),
        )
}
