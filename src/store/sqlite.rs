//! SQLite-backed command store

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use super::{CommandStore, SavedCommand, StoreError};

/// Saved commands persisted in a SQLite database
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    /// If path is None, uses an in-memory database.
    pub async fn open(path: Option<&str>) -> Result<Self, StoreError> {
        let conn_str = match path {
            Some(p) => format!("sqlite:{}?mode=rwc", p),
            None => "sqlite::memory:".to_string(),
        };

        let options = SqliteConnectOptions::from_str(&conn_str)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = match path {
            Some(_) => SqlitePoolOptions::new().max_connections(4),
            // Each in-memory connection is its own database; keep exactly one alive
            None => SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None),
        }
        .connect_with(options)
        .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        info!("Running saved command migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS saved_commands (
                name TEXT PRIMARY KEY,
                command TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl CommandStore for SqliteStore {
    async fn save(&self, name: &str, command: &str) -> Result<(), StoreError> {
        let updated_at = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO saved_commands (name, command, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET command = excluded.command, updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(command)
        .bind(&updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT command FROM saved_commands WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(command,)| command))
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM saved_commands WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<SavedCommand>, StoreError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT name, command FROM saved_commands ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(name, command)| SavedCommand { name, command })
            .collect())
    }
}
