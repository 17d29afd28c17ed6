//! `SQLite` implementation of [`ScheduleRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use greenhub_app::ports::ScheduleRepository;
use greenhub_domain::error::GreenHubError;
use greenhub_domain::id::{DeviceAddress, ScheduleId};
use greenhub_domain::schedule::{Recurrence, Schedule};

use crate::error::{StorageError, decode_error, format_timestamp, parse_timestamp};

struct Wrapper(Schedule);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let device: String = row.try_get("device_address")?;
        let value: String = row.try_get("value")?;
        let trigger_at: String = row.try_get("trigger_at")?;
        let recurrence: String = row.try_get("recurrence")?;

        Ok(Self(Schedule {
            id: ScheduleId::new(row.try_get("id")?),
            device: DeviceAddress::new(device),
            property: row.try_get("property")?,
            value: serde_json::from_str(&value).map_err(decode_error)?,
            trigger_at: parse_timestamp(&trigger_at)?,
            recurrence: recurrence.parse::<Recurrence>().map_err(decode_error)?,
        }))
    }
}

const INSERT: &str = r"
    INSERT INTO schedules (device_address, property, value, trigger_at, recurrence, created_at)
    VALUES (?, ?, ?, ?, ?, ?)
";

/// `SQLite`-backed schedule repository.
pub struct SqliteScheduleRepository {
    pool: SqlitePool,
}

impl SqliteScheduleRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl ScheduleRepository for SqliteScheduleRepository {
    async fn create(&self, schedule: Schedule) -> Result<Schedule, GreenHubError> {
        let value = serde_json::to_string(&schedule.value).map_err(StorageError::from)?;
        let result = sqlx::query(INSERT)
            .bind(schedule.device.as_str())
            .bind(&schedule.property)
            .bind(&value)
            .bind(format_timestamp(&schedule.trigger_at))
            .bind(schedule.recurrence.as_str())
            .bind(format_timestamp(&greenhub_domain::time::now()))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(schedule.with_id(ScheduleId::new(result.last_insert_rowid())))
    }

    async fn get_all(&self) -> Result<Vec<Schedule>, GreenHubError> {
        let rows = sqlx::query("SELECT * FROM schedules ORDER BY trigger_at, id")
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        let mut schedules = Vec::with_capacity(rows.len());
        for row in &rows {
            match Wrapper::from_row(row) {
                Ok(Wrapper(schedule)) => schedules.push(schedule),
                Err(err) => {
                    let id: Option<i64> = row.try_get("id").ok();
                    tracing::warn!(?id, error = %err, "skipping malformed schedule row");
                }
            }
        }
        Ok(schedules)
    }

    async fn delete(&self, id: ScheduleId) -> Result<bool, GreenHubError> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = ?")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Config;
    use chrono::{Duration, SubsecRound, Utc};
    use serde_json::json;

    async fn setup() -> SqliteScheduleRepository {
        let db = Config::new("sqlite::memory:").build().await.unwrap();
        SqliteScheduleRepository::new(db.pool().clone())
    }

    fn watering(in_hours: i64, recurrence: Recurrence) -> Schedule {
        Schedule::new(
            DeviceAddress::new("0x02"),
            "state",
            json!("ON"),
            (Utc::now() + Duration::hours(in_hours)).trunc_subsecs(6),
            recurrence,
        )
    }

    #[tokio::test]
    async fn should_read_back_created_schedule() {
        let repo = setup().await;
        let created = repo.create(watering(1, Recurrence::Daily)).await.unwrap();
        assert_eq!(created.id, ScheduleId::new(1));

        let all = repo.get_all().await.unwrap();
        assert_eq!(all, vec![created]);
    }

    #[tokio::test]
    async fn should_list_schedules_by_trigger_time() {
        let repo = setup().await;
        repo.create(watering(5, Recurrence::Once)).await.unwrap();
        repo.create(watering(1, Recurrence::Once)).await.unwrap();

        let ids: Vec<i64> = repo
            .get_all()
            .await
            .unwrap()
            .iter()
            .map(|s| s.id.get())
            .collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn should_skip_malformed_rows() {
        let repo = setup().await;
        repo.create(watering(1, Recurrence::Once)).await.unwrap();
        repo.create(watering(2, Recurrence::Once)).await.unwrap();
        sqlx::query("UPDATE schedules SET trigger_at = 'tomorrow-ish' WHERE id = 1")
            .execute(&repo.pool)
            .await
            .unwrap();

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, ScheduleId::new(2));
    }

    #[tokio::test]
    async fn should_report_whether_delete_removed_a_row() {
        let repo = setup().await;
        let created = repo.create(watering(1, Recurrence::Once)).await.unwrap();

        assert!(repo.delete(created.id).await.unwrap());
        assert!(!repo.delete(created.id).await.unwrap());
    }
}
