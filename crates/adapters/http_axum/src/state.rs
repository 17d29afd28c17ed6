//! Shared application state for axum handlers.

use std::sync::Arc;

use greenhub_app::ports::{
    CommandPublisher, ScenarioRepository, ScheduleRepository, TelemetryHistoryRepository,
};
use greenhub_app::services::device_service::DeviceService;
use greenhub_app::services::scenario_service::ScenarioService;
use greenhub_app::services::schedule_service::ScheduleService;

/// Application state shared across all axum handlers.
///
/// Generic over the history repository, the command publisher, and the
/// scenario and schedule repositories to avoid dynamic dispatch. `Clone` is
/// implemented manually so the underlying types themselves do not need to be
/// `Clone`; only the `Arc` wrappers are cloned.
pub struct AppState<HR, P, SR, SCR> {
    pub device_service: Arc<DeviceService<HR, P>>,
    pub scenario_service: Arc<ScenarioService<SR>>,
    pub schedule_service: Arc<ScheduleService<SCR, P>>,
}

impl<HR, P, SR, SCR> Clone for AppState<HR, P, SR, SCR> {
    fn clone(&self) -> Self {
        Self {
            device_service: Arc::clone(&self.device_service),
            scenario_service: Arc::clone(&self.scenario_service),
            schedule_service: Arc::clone(&self.schedule_service),
        }
    }
}

impl<HR, P, SR, SCR> AppState<HR, P, SR, SCR>
where
    HR: TelemetryHistoryRepository + Send + Sync + 'static,
    P: CommandPublisher + 'static,
    SR: ScenarioRepository + Send + Sync + 'static,
    SCR: ScheduleRepository + Send + Sync + 'static,
{
    /// Create a new application state from service instances.
    pub fn new(
        device_service: DeviceService<HR, P>,
        scenario_service: ScenarioService<SR>,
        schedule_service: ScheduleService<SCR, P>,
    ) -> Self {
        Self::from_arcs(
            Arc::new(device_service),
            Arc::new(scenario_service),
            Arc::new(schedule_service),
        )
    }

    /// Create a new application state from pre-wrapped `Arc` services.
    ///
    /// Use this when services need to be shared with background tasks
    /// before constructing the HTTP state.
    pub fn from_arcs(
        device_service: Arc<DeviceService<HR, P>>,
        scenario_service: Arc<ScenarioService<SR>>,
        schedule_service: Arc<ScheduleService<SCR, P>>,
    ) -> Self {
        Self {
            device_service,
            scenario_service,
            schedule_service,
        }
    }
}
