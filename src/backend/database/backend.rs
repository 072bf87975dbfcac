// src/backend/database/backend.rs

//! Durable-store backend implementation using SQLite via `sqlx`.
//!
//! Persistent and cross-process-safe at relatively low throughput.
//! Messages live in a single append-only table whose auto-incrementing
//! row id doubles as the FIFO insertion-order tiebreaker:
//!
//! ```sql
//! CREATE TABLE channel_messages (
//!     id      INTEGER PRIMARY KEY AUTOINCREMENT,
//!     channel TEXT    NOT NULL,
//!     content TEXT    NOT NULL,
//!     expiry  INTEGER NOT NULL
//! );
//! ```
//!
//! Group memberships live in a parallel `<table>_groups` table swept with
//! the same grace window.
//!
//! ## Maintenance
//!
//! Expired rows are deleted by a sweep performed on every read path, not
//! by a background job. The sweep lags logical expiry by a grace window
//! so concurrent readers holding a just-selected row id still resolve it.
//!
//! ## Delivery under contention
//!
//! Two consumers can select the same oldest row concurrently. The claim
//! is the `DELETE ... WHERE id = ?` that follows: only one delete affects
//! a row, and the loser loops back to select again. Each stored message
//! is therefore delivered at most once.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{QueryBuilder, Row, SqlitePool};

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::{
    // ---
    domain::{ensure_channels, now_ms, EXPIRY_GRACE_SECS},
    BackendPtr,
    ChannelBackend,
    ChannelConfig,
    Error,
    Message,
    Result,
};

fn unavailable(err: sqlx::Error) -> Error {
    Error::Unavailable(format!("sqlite: {err}"))
}

/// Durable-store implementation of the `ChannelBackend` trait.
struct DatabaseBackend {
    // ---
    expiry_secs: i64,
    table: String,
    groups_table: String,
    pool: SqlitePool,
}

impl DatabaseBackend {
    /// Maintenance sweep: drop message rows expired past the grace window.
    async fn sweep_expired(&self, now: i64) -> Result<()> {
        // ---
        sqlx::query(&format!("DELETE FROM {} WHERE expiry < ?", self.table))
            .bind(now - EXPIRY_GRACE_SECS * 1000)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;

        Ok(())
    }

    /// Select the single oldest live row among `channels`, if any.
    async fn select_oldest(
        &self,
        channels: &[String],
        now: i64,
    ) -> Result<Option<(i64, String, String)>> {
        // ---
        let mut query: QueryBuilder<'_, sqlx::Sqlite> = QueryBuilder::new(format!(
            "SELECT id, channel, content FROM {} WHERE expiry > ",
            self.table
        ));
        query.push_bind(now);
        query.push(" AND channel IN (");
        {
            let mut names = query.separated(", ");
            for channel in channels {
                names.push_bind(channel);
            }
        }
        query.push(") ORDER BY id LIMIT 1");

        let row = query
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        Ok(row.map(|row| (row.get("id"), row.get("channel"), row.get("content"))))
    }
}

#[async_trait::async_trait]
impl ChannelBackend for DatabaseBackend {
    // ---

    async fn send(&self, channel: &str, message: Message) -> Result<()> {
        // ---
        let content = serde_json::to_string(&message)?;

        sqlx::query(&format!(
            "INSERT INTO {} (channel, content, expiry) VALUES (?, ?, ?)",
            self.table
        ))
        .bind(channel)
        .bind(content)
        .bind(now_ms() + self.expiry_secs * 1000)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(())
    }

    async fn receive_many(&self, channels: &[String]) -> Result<Option<(String, Message)>> {
        // ---
        ensure_channels(channels)?;

        let now = now_ms();
        self.sweep_expired(now).await?;

        loop {
            let Some((id, channel, content)) = self.select_oldest(channels, now).await? else {
                return Ok(None);
            };

            let deleted = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", self.table))
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(unavailable)?;

            if deleted.rows_affected() == 0 {
                // A concurrent consumer claimed this row first.
                continue;
            }

            let message: Message = serde_json::from_str(&content)?;
            return Ok(Some((channel, message)));
        }
    }

    async fn group_add(
        &self,
        group: &str,
        channel: &str,
        expiry_secs: Option<i64>,
    ) -> Result<()> {
        // ---
        let expiry = expiry_secs.unwrap_or(self.expiry_secs);

        sqlx::query(&format!(
            "INSERT INTO {} (group_name, channel, expiry) VALUES (?, ?, ?) \
             ON CONFLICT(group_name, channel) DO UPDATE SET expiry = excluded.expiry",
            self.groups_table
        ))
        .bind(group)
        .bind(channel)
        .bind(now_ms() + expiry * 1000)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(())
    }

    async fn group_discard(&self, group: &str, channel: &str) -> Result<()> {
        // ---
        sqlx::query(&format!(
            "DELETE FROM {} WHERE group_name = ? AND channel = ?",
            self.groups_table
        ))
        .bind(group)
        .bind(channel)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(())
    }

    async fn group_channels(&self, group: &str) -> Result<BTreeSet<String>> {
        // ---
        let now = now_ms();

        // Same sweep-then-query pattern as the message table.
        sqlx::query(&format!(
            "DELETE FROM {} WHERE group_name = ? AND expiry < ?",
            self.groups_table
        ))
        .bind(group)
        .bind(now - EXPIRY_GRACE_SECS * 1000)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        let rows = sqlx::query(&format!(
            "SELECT channel FROM {} WHERE group_name = ? AND expiry > ?",
            self.groups_table
        ))
        .bind(group)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(rows.iter().map(|row| row.get("channel")).collect())
    }

    async fn flush(&self) -> Result<()> {
        // ---
        sqlx::query(&format!("DELETE FROM {}", self.table))
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;

        sqlx::query(&format!("DELETE FROM {}", self.groups_table))
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;

        Ok(())
    }
}

/// Create a durable-store backend for the configured SQLite database.
///
/// Creates the message and group tables (and their indexes) if they do
/// not exist yet. WAL mode is enabled for on-disk databases so multiple
/// processes can read while one writes.
///
/// # Errors
///
/// Returns a configuration error when `database_path` is missing, and an
/// unavailability error when the database cannot be opened or migrated.
pub async fn create_backend(config: &ChannelConfig) -> Result<BackendPtr> {
    // ---

    let Some(path) = config.database_path.as_deref() else {
        return Err(Error::Configuration(
            "database backend requires a database_path".to_string(),
        ));
    };

    let url = if path == ":memory:" {
        "sqlite::memory:".to_string()
    } else {
        format!("sqlite:{path}?mode=rwc")
    };

    // A single connection: SQLite serializes writers anyway, and with
    // `:memory:` every new connection would get a fresh database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .map_err(|err| Error::Unavailable(format!("sqlite: failed to open {path}: {err}")))?;

    if path != ":memory:" {
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await
            .map_err(unavailable)?;
    }

    let table = config.table.clone();
    let groups_table = format!("{table}_groups");

    let schema = [
        format!(
            "CREATE TABLE IF NOT EXISTS {table} ( \
                 id      INTEGER PRIMARY KEY AUTOINCREMENT, \
                 channel TEXT    NOT NULL, \
                 content TEXT    NOT NULL, \
                 expiry  INTEGER NOT NULL \
             )"
        ),
        format!("CREATE INDEX IF NOT EXISTS {table}_channel_idx ON {table}(channel)"),
        format!("CREATE INDEX IF NOT EXISTS {table}_expiry_idx ON {table}(expiry)"),
        format!(
            "CREATE TABLE IF NOT EXISTS {groups_table} ( \
                 group_name TEXT    NOT NULL, \
                 channel    TEXT    NOT NULL, \
                 expiry     INTEGER NOT NULL, \
                 UNIQUE(group_name, channel) \
             )"
        ),
        format!("CREATE INDEX IF NOT EXISTS {groups_table}_expiry_idx ON {groups_table}(expiry)"),
    ];

    for statement in &schema {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .map_err(unavailable)?;
    }

    Ok(Arc::new(DatabaseBackend {
        expiry_secs: config.expiry_secs,
        table,
        groups_table,
        pool,
    }))
}
