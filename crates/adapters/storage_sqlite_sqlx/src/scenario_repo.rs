//! `SQLite` implementation of [`ScenarioRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use greenhub_app::ports::ScenarioRepository;
use greenhub_domain::error::GreenHubError;
use greenhub_domain::id::{DeviceAddress, ScenarioId};
use greenhub_domain::scenario::{Operator, Scenario};
use greenhub_domain::telemetry::Properties;

use crate::error::{StorageError, decode_error, format_timestamp};

struct Wrapper(Scenario);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let source: String = row.try_get("source_address")?;
        let operator: String = row.try_get("operator")?;
        let operator: Operator = operator.parse().map_err(decode_error)?;
        let payload: String = row.try_get("action_payload")?;
        let action_payload: Properties = serde_json::from_str(&payload).map_err(decode_error)?;

        Ok(Self(Scenario {
            id: ScenarioId::new(row.try_get("id")?),
            source: DeviceAddress::new(source),
            property: row.try_get("property")?,
            operator,
            comparison_value: row.try_get("comparison_value")?,
            target_topic: row.try_get("target_topic")?,
            action_payload,
        }))
    }
}

const INSERT: &str = r"
    INSERT INTO scenarios (source_address, property, operator, comparison_value, target_topic, action_payload, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
";

/// `SQLite`-backed scenario repository.
pub struct SqliteScenarioRepository {
    pool: SqlitePool,
}

impl SqliteScenarioRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl ScenarioRepository for SqliteScenarioRepository {
    async fn create(&self, scenario: Scenario) -> Result<Scenario, GreenHubError> {
        let payload = serde_json::to_string(&scenario.action_payload).map_err(StorageError::from)?;
        let result = sqlx::query(INSERT)
            .bind(scenario.source.as_str())
            .bind(&scenario.property)
            .bind(scenario.operator.symbol())
            .bind(&scenario.comparison_value)
            .bind(&scenario.target_topic)
            .bind(&payload)
            .bind(format_timestamp(&greenhub_domain::time::now()))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(scenario.with_id(ScenarioId::new(result.last_insert_rowid())))
    }

    async fn get_all(&self) -> Result<Vec<Scenario>, GreenHubError> {
        let rows = sqlx::query("SELECT * FROM scenarios ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        let mut scenarios = Vec::with_capacity(rows.len());
        for row in &rows {
            match Wrapper::from_row(row) {
                Ok(Wrapper(scenario)) => scenarios.push(scenario),
                Err(err) => {
                    let id: Option<i64> = row.try_get("id").ok();
                    tracing::warn!(?id, error = %err, "skipping malformed scenario row");
                }
            }
        }
        Ok(scenarios)
    }

    async fn delete(&self, id: ScenarioId) -> Result<bool, GreenHubError> {
        let result = sqlx::query("DELETE FROM scenarios WHERE id = ?")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(result.rows_affected() > 0)
    }
}
