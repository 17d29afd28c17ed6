//! `SQLite` pool for the hub.
//!
//! The history writer, the ingestion workers and the HTTP services all write
//! concurrently, so connections run in WAL mode and wait on a locked database
//! instead of failing with `SQLITE_BUSY`.

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::error::StorageError;

/// Default number of pooled connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Default wait on a locked database before a query fails.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings of the storage adapter.
#[derive(Debug, Clone)]
pub struct Config {
    /// `SQLite` connection URL (e.g. `sqlite:greenhub.db` or `sqlite::memory:`).
    pub database_url: String,
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl Config {
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// Open the pool, creating the database file if missing, and apply
    /// pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] for an invalid URL, a failed connection, or a
    /// failed migration.
    pub async fn build(self) -> Result<Database, StorageError> {
        let options = SqliteConnectOptions::from_str(&self.database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(self.busy_timeout);
        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!(
            database_url = %self.database_url,
            max_connections = self.max_connections,
            "database ready"
        );
        Ok(Database { pool })
    }
}

/// Owns the pool shared by every repository.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection, waiting for in-flight queries.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_create_hub_tables_when_using_memory_db() {
        let db = Config::new("sqlite::memory:").build().await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name != '_sqlx_migrations' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();

        let names: Vec<&str> = tables.iter().map(|row| row.0.as_str()).collect();
        assert_eq!(
            names,
            vec!["devices", "scenarios", "schedules", "telemetry_history"]
        );
    }

    #[tokio::test]
    async fn should_apply_pool_settings() {
        let db = Config::new("sqlite::memory:")
            .with_max_connections(2)
            .with_busy_timeout(Duration::from_millis(1500))
            .build()
            .await
            .unwrap();

        let (busy_timeout,): (i64,) = sqlx::query_as("PRAGMA busy_timeout")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(busy_timeout, 1500);
        assert_eq!(db.pool().options().get_max_connections(), 2);
    }

    #[tokio::test]
    async fn should_refuse_queries_after_close() {
        let db = Config::new("sqlite::memory:").build().await.unwrap();
        db.close().await;
        assert!(db.pool().is_closed());
        let result = sqlx::query("SELECT 1").execute(db.pool()).await;
        assert!(result.is_err());
    }
}
