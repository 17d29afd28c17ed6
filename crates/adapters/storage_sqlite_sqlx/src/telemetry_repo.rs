//! `SQLite` implementation of [`TelemetryHistoryRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use greenhub_app::ports::TelemetryHistoryRepository;
use greenhub_domain::error::GreenHubError;
use greenhub_domain::id::DeviceAddress;
use greenhub_domain::telemetry::TelemetryRecord;

use crate::error::{StorageError, format_timestamp, parse_timestamp};

struct Wrapper(TelemetryRecord);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let device: String = row.try_get("device_address")?;
        let recorded_at: String = row.try_get("recorded_at")?;
        Ok(Self(TelemetryRecord {
            device: DeviceAddress::new(device),
            recorded_at: parse_timestamp(&recorded_at)?,
            payload: row.try_get("payload")?,
        }))
    }
}

const INSERT: &str = r"
    INSERT INTO telemetry_history (device_address, recorded_at, payload)
    VALUES (?, ?, ?)
";

const SELECT_RECENT: &str = r"
    SELECT device_address, recorded_at, payload FROM telemetry_history
    WHERE device_address = ?
    ORDER BY recorded_at DESC, id DESC
    LIMIT ?
";

/// `SQLite`-backed telemetry history repository.
pub struct SqliteTelemetryHistoryRepository {
    pool: SqlitePool,
}

impl SqliteTelemetryHistoryRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl TelemetryHistoryRepository for SqliteTelemetryHistoryRepository {
    async fn record(&self, record: TelemetryRecord) -> Result<(), GreenHubError> {
        sqlx::query(INSERT)
            .bind(record.device.as_str())
            .bind(format_timestamp(&record.recorded_at))
            .bind(&record.payload)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn latest(
        &self,
        device: &DeviceAddress,
    ) -> Result<Option<TelemetryRecord>, GreenHubError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_RECENT)
            .bind(device.as_str())
            .bind(1_i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(row.map(|w| w.0))
    }

    async fn recent(
        &self,
        device: &DeviceAddress,
        limit: usize,
    ) -> Result<Vec<TelemetryRecord>, GreenHubError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_RECENT)
            .bind(device.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}
