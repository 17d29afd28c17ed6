//! `SQLite` implementation of [`DeviceRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use greenhub_app::ports::DeviceRepository;
use greenhub_domain::device::{Device, Expose};
use greenhub_domain::error::GreenHubError;
use greenhub_domain::id::DeviceAddress;

use crate::error::{StorageError, decode_error, format_timestamp};

/// Wrapper for converting database rows into domain types without polluting
/// domain structs with database concerns.
struct Wrapper(Device);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let address: String = row.try_get("address")?;
        let exposes_json: String = row.try_get("exposes")?;
        let exposes: Vec<Expose> = serde_json::from_str(&exposes_json).map_err(decode_error)?;

        Ok(Self(Device {
            address: DeviceAddress::new(address),
            friendly_name: row.try_get("friendly_name")?,
            kind: row.try_get("kind")?,
            manufacturer: row.try_get("manufacturer")?,
            model: row.try_get("model")?,
            description: row.try_get("description")?,
            exposes,
            telemetry: None,
        }))
    }
}

const UPSERT: &str = r"
    INSERT INTO devices (address, friendly_name, kind, manufacturer, model, description, exposes, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (address) DO UPDATE SET
        friendly_name = excluded.friendly_name,
        kind = excluded.kind,
        manufacturer = excluded.manufacturer,
        model = excluded.model,
        description = excluded.description,
        exposes = excluded.exposes,
        updated_at = excluded.updated_at
";

/// `SQLite`-backed device repository.
pub struct SqliteDeviceRepository {
    pool: SqlitePool,
}

impl SqliteDeviceRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl DeviceRepository for SqliteDeviceRepository {
    async fn upsert_all(&self, devices: Vec<Device>) -> Result<(), GreenHubError> {
        let now = format_timestamp(&greenhub_domain::time::now());
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;
        for device in &devices {
            let exposes_json = serde_json::to_string(&device.exposes).map_err(StorageError::from)?;
            sqlx::query(UPSERT)
                .bind(device.address.as_str())
                .bind(&device.friendly_name)
                .bind(&device.kind)
                .bind(&device.manufacturer)
                .bind(&device.model)
                .bind(&device.description)
                .bind(&exposes_json)
                .bind(&now)
                .execute(&mut *tx)
                .await
                .map_err(StorageError::from)?;
        }
        tx.commit().await.map_err(StorageError::from)?;
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Device>, GreenHubError> {
        let rows: Vec<Wrapper> = sqlx::query_as("SELECT * FROM devices ORDER BY friendly_name")
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}
