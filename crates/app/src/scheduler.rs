//! Scheduler: one timer task per armed schedule.
//!
//! Each timer waits for an absolute deadline and can be cancelled through
//! its handle, which lives in a side table keyed by schedule id. Timer
//! tokens are children of the process shutdown token.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use greenhub_domain::id::ScheduleId;
use greenhub_domain::schedule::Schedule;
use greenhub_domain::time::Timestamp;
use greenhub_domain::topic::Topics;

use crate::ports::CommandPublisher;
use crate::registry::DeviceRegistry;

struct TimerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

struct SchedulerInner<P> {
    publisher: Arc<P>,
    registry: Arc<DeviceRegistry>,
    topics: Topics,
    shutdown: CancellationToken,
    handles: RwLock<HashMap<ScheduleId, TimerHandle>>,
}

/// Arms and cancels schedule timers.
pub struct Scheduler<P> {
    inner: Arc<SchedulerInner<P>>,
}

impl<P> Clone for Scheduler<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: CommandPublisher + 'static> Scheduler<P> {
    pub fn new(
        publisher: Arc<P>,
        registry: Arc<DeviceRegistry>,
        topics: Topics,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                publisher,
                registry,
                topics,
                shutdown,
                handles: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Start the timer of a persisted schedule, replacing any timer already
    /// armed for the same id.
    ///
    /// Returns `false` when the schedule will never fire again (an elapsed
    /// one-shot), in which case nothing is armed.
    pub async fn arm(&self, schedule: Schedule) -> bool {
        let Some(deadline) = schedule.next_fire_after(Utc::now()) else {
            return false;
        };
        let id = schedule.id;
        let token = self.inner.shutdown.child_token();
        let mut handles = self.inner.handles.write().await;
        if let Some(previous) = handles.remove(&id) {
            previous.token.cancel();
        }
        let task = tokio::spawn(run_timer(
            Arc::clone(&self.inner),
            schedule,
            token.clone(),
            deadline,
        ));
        handles.insert(id, TimerHandle { token, task });
        tracing::debug!(schedule_id = %id, %deadline, "schedule armed");
        true
    }

    /// Cancel the timer of a schedule, returning whether one was armed.
    pub async fn cancel(&self, id: ScheduleId) -> bool {
        let handle = self.inner.handles.write().await.remove(&id);
        match handle {
            Some(handle) => {
                handle.token.cancel();
                tracing::debug!(schedule_id = %id, "schedule cancelled");
                true
            }
            None => false,
        }
    }

    pub async fn is_armed(&self, id: ScheduleId) -> bool {
        self.inner.handles.read().await.contains_key(&id)
    }

    pub async fn armed_count(&self) -> usize {
        self.inner.handles.read().await.len()
    }

    /// Wait for every timer task to observe cancellation.
    pub async fn join_all(&self) {
        let handles: Vec<TimerHandle> = self
            .inner
            .handles
            .write()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for handle in handles {
            handle.token.cancel();
            if let Err(err) = handle.task.await {
                tracing::warn!(%err, "schedule timer task failed");
            }
        }
    }
}

async fn run_timer<P: CommandPublisher>(
    inner: Arc<SchedulerInner<P>>,
    schedule: Schedule,
    token: CancellationToken,
    mut deadline: Timestamp,
) {
    loop {
        let wait = (deadline - Utc::now()).to_std().unwrap_or_default();
        tokio::select! {
            () = token.cancelled() => return,
            () = tokio::time::sleep(wait) => {}
        }
        inner.fire(&schedule).await;
        match schedule.next_fire_after(deadline) {
            Some(next) => deadline = next,
            None => break,
        }
    }
    let mut handles = inner.handles.write().await;
    // a cancelled token means the entry now belongs to a newer timer
    if !token.is_cancelled() {
        handles.remove(&schedule.id);
    }
}

impl<P: CommandPublisher> SchedulerInner<P> {
    async fn fire(&self, schedule: &Schedule) {
        let Some(device) = self.registry.get(&schedule.device).await else {
            tracing::warn!(
                schedule_id = %schedule.id,
                device = %schedule.device,
                "schedule target device is unknown, nothing sent"
            );
            return;
        };
        let topic = self.topics.command(&device.friendly_name);
        match self
            .publisher
            .publish(&topic, &schedule.command_payload())
            .await
        {
            Ok(()) => tracing::info!(
                schedule_id = %schedule.id,
                device = %device.friendly_name,
                property = %schedule.property,
                "schedule fired"
            ),
            Err(err) => tracing::warn!(
                schedule_id = %schedule.id,
                device = %device.friendly_name,
                error = %err,
                "failed to publish scheduled command"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{SpyPublisher, descriptor, props};
    use chrono::Duration;
    use greenhub_domain::id::DeviceAddress;
    use greenhub_domain::schedule::Recurrence;
    use serde_json::json;

    async fn setup() -> (Scheduler<SpyPublisher>, Arc<SpyPublisher>, CancellationToken) {
        let registry = Arc::new(DeviceRegistry::new());
        registry.upsert_devices(&[descriptor("0x02", "valve-1")]).await;
        let publisher = Arc::new(SpyPublisher::default());
        let shutdown = CancellationToken::new();
        let scheduler = Scheduler::new(
            Arc::clone(&publisher),
            registry,
            Topics::default(),
            shutdown.clone(),
        );
        (scheduler, publisher, shutdown)
    }

    fn schedule(id: i64, address: &str, in_secs: i64) -> Schedule {
        Schedule::new(
            DeviceAddress::new(address),
            "state",
            json!("ON"),
            Utc::now() + Duration::seconds(in_secs),
            Recurrence::Once,
        )
        .with_id(ScheduleId::new(id))
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn should_publish_once_when_deadline_reached() {
        let (scheduler, publisher, _shutdown) = setup().await;
        assert!(scheduler.arm(schedule(1, "0x02", 60)).await);
        settle().await;

        tokio::time::advance(std::time::Duration::from_secs(30)).await;
        settle().await;
        assert!(publisher.published().is_empty());

        tokio::time::advance(std::time::Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(
            publisher.published(),
            vec![(
                "zigbee2mqtt/valve-1/set".to_string(),
                props(json!({"state": "ON"}))
            )]
        );
        assert!(!scheduler.is_armed(ScheduleId::new(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn should_suppress_publish_when_cancelled_before_deadline() {
        let (scheduler, publisher, _shutdown) = setup().await;
        scheduler.arm(schedule(1, "0x02", 60)).await;
        settle().await;

        assert!(scheduler.cancel(ScheduleId::new(1)).await);
        assert!(!scheduler.cancel(ScheduleId::new(1)).await);

        tokio::time::advance(std::time::Duration::from_secs(120)).await;
        settle().await;
        assert!(publisher.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_arm_elapsed_one_shot() {
        let (scheduler, _publisher, _shutdown) = setup().await;
        assert!(!scheduler.arm(schedule(1, "0x02", -60)).await);
        assert_eq!(scheduler.armed_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_skip_fire_when_device_unknown() {
        let (scheduler, publisher, _shutdown) = setup().await;
        scheduler.arm(schedule(1, "0x99", 5)).await;
        settle().await;

        tokio::time::advance(std::time::Duration::from_secs(6)).await;
        settle().await;
        assert!(publisher.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn should_replace_timer_when_rearmed_with_same_id() {
        let (scheduler, publisher, _shutdown) = setup().await;
        scheduler.arm(schedule(1, "0x02", 10)).await;
        scheduler.arm(schedule(1, "0x02", 100)).await;
        assert_eq!(scheduler.armed_count().await, 1);
        settle().await;

        tokio::time::advance(std::time::Duration::from_secs(11)).await;
        settle().await;
        assert!(publisher.published().is_empty());
        assert!(scheduler.is_armed(ScheduleId::new(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn should_stop_all_timers_on_shutdown() {
        let (scheduler, publisher, shutdown) = setup().await;
        scheduler.arm(schedule(1, "0x02", 10)).await;
        scheduler.arm(schedule(2, "0x02", 20)).await;

        shutdown.cancel();
        scheduler.join_all().await;

        tokio::time::advance(std::time::Duration::from_secs(30)).await;
        settle().await;
        assert!(publisher.published().is_empty());
        assert_eq!(scheduler.armed_count().await, 0);
    }
}
