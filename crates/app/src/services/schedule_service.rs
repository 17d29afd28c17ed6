//! Schedule service: persisted schedules and their armed timers.

use std::sync::Arc;

use greenhub_domain::error::{GreenHubError, NotFoundError, ValidationError};
use greenhub_domain::id::ScheduleId;
use greenhub_domain::schedule::{Recurrence, Schedule};

use crate::ports::{CommandPublisher, ScheduleRepository};
use crate::registry::DeviceRegistry;
use crate::scheduler::Scheduler;

/// Outcome of loading persisted schedules at startup.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub armed: usize,
    /// One-shot schedules whose trigger time already passed.
    pub elapsed: usize,
}

/// Application service for schedule CRUD operations.
pub struct ScheduleService<R, P> {
    repo: Arc<R>,
    scheduler: Scheduler<P>,
    registry: Arc<DeviceRegistry>,
}

impl<R, P> ScheduleService<R, P>
where
    R: ScheduleRepository + Send + Sync,
    P: CommandPublisher + 'static,
{
    pub fn new(repo: Arc<R>, scheduler: Scheduler<P>, registry: Arc<DeviceRegistry>) -> Self {
        Self {
            repo,
            scheduler,
            registry,
        }
    }

    /// Arm every persisted schedule. Elapsed one-shots stay unarmed.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn load_all(&self) -> Result<LoadReport, GreenHubError> {
        let mut report = LoadReport::default();
        for schedule in self.repo.get_all().await? {
            let id = schedule.id;
            if self.scheduler.arm(schedule).await {
                report.armed += 1;
            } else {
                tracing::info!(schedule_id = %id, "schedule already elapsed, left unarmed");
                report.elapsed += 1;
            }
        }
        tracing::info!(armed = report.armed, elapsed = report.elapsed, "schedules loaded");
        Ok(report)
    }

    /// Persist a new schedule, then arm its timer.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::Validation`] if invariants fail or a one-shot
    /// trigger time is not in the future, [`GreenHubError::NotFound`] if the
    /// target device is unknown, or a storage error.
    #[tracing::instrument(skip(self, schedule), fields(device = %schedule.device, property = %schedule.property))]
    pub async fn create_schedule(&self, schedule: Schedule) -> Result<Schedule, GreenHubError> {
        schedule.validate()?;
        if !self.registry.contains(&schedule.device).await {
            return Err(NotFoundError {
                entity: "Device",
                id: schedule.device.to_string(),
            }
            .into());
        }
        if schedule.recurrence == Recurrence::Once
            && schedule.trigger_at <= greenhub_domain::time::now()
        {
            return Err(ValidationError::TriggerInPast.into());
        }
        let created = self.repo.create(schedule).await?;
        self.scheduler.arm(created.clone()).await;
        tracing::info!(
            schedule_id = %created.id,
            cron = %created.cron_expression(),
            "schedule created"
        );
        Ok(created)
    }

    /// List every persisted schedule.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_schedules(&self) -> Result<Vec<Schedule>, GreenHubError> {
        self.repo.get_all().await
    }

    /// Cancel a schedule's timer, then delete its row.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::NotFound`] when neither a timer nor a row
    /// exists, or a storage error when the row could not be deleted (the
    /// timer is cancelled regardless).
    #[tracing::instrument(skip(self))]
    pub async fn delete_schedule(&self, id: ScheduleId) -> Result<(), GreenHubError> {
        let cancelled = self.scheduler.cancel(id).await;
        let deleted = match self.repo.delete(id).await {
            Ok(deleted) => deleted,
            Err(err) => {
                tracing::warn!(schedule_id = %id, cancelled, error = %err, "timer cancelled but row not deleted");
                return Err(err);
            }
        };
        if !cancelled && !deleted {
            return Err(NotFoundError {
                entity: "Schedule",
                id: id.to_string(),
            }
            .into());
        }
        tracing::info!(schedule_id = %id, "schedule deleted");
        Ok(())
    }
}
