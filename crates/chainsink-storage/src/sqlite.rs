//! SQLite backend for ChainSink.
//!
//! Persists the ingest cursor and the per-kind event collections in a
//! single SQLite file. Uses `sqlx` with WAL mode for concurrent read
//! performance.
//!
//! Schema creation lives in [`SqliteStore::bootstrap_schema`] — the
//! external bootstrap step. The ingestion run path never issues DDL; it
//! only fail-fast checks that its target collections exist.
//!
//! # Usage
//! ```rust,no_run
//! use chainsink_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./chainsink.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteArguments, SqlitePoolOptions};
use sqlx::{Row as _, SqlitePool};
use tracing::debug;

use chainsink_core::cursor::{CursorStore, Position};
use chainsink_core::error::IngestError;
use chainsink_core::event::EventKind;
use chainsink_core::sink::{Row, SinkStore};

/// SQLite-backed cursor store and analytical sink.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./chainsink.db"`) or a full
    /// SQLite URL (`"sqlite:./chainsink.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IngestError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.enable_wal().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. Capped to a single
    /// connection: each in-memory connection is its own database, so the
    /// bootstrapped schema must stay on the one shared handle.
    pub async fn in_memory() -> Result<Self, IngestError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?;

        Ok(Self { pool })
    }

    async fn enable_wal(&self) -> Result<(), IngestError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Create the cursor table and every event collection under `prefix`.
    ///
    /// This is the external bootstrap step: invoked by `chainsink
    /// bootstrap` and by tests, never by the running pipeline.
    pub async fn bootstrap_schema(&self, prefix: &str) -> Result<(), IngestError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS ingest_cursor (
                stream_id    TEXT    NOT NULL,
                token        TEXT    NOT NULL,
                block_number INTEGER NOT NULL,
                confirmed_at INTEGER NOT NULL,
                PRIMARY KEY (stream_id, token)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::Storage(e.to_string()))?;

        for kind in EventKind::ALL {
            let collection = kind.collection(prefix);
            let payload_cols = payload_columns(kind)
                .iter()
                .map(|col| format!("\"{col}\" TEXT NOT NULL"))
                .collect::<Vec<_>>()
                .join(",\n                ");

            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS \"{collection}\" (
                contract_address  TEXT    NOT NULL,
                block_number      INTEGER NOT NULL,
                block_hash        TEXT    NOT NULL,
                block_timestamp   INTEGER NOT NULL,
                transaction_hash  TEXT    NOT NULL,
                transaction_index INTEGER NOT NULL,
                log_index         INTEGER NOT NULL,
                {payload_cols}
            );"
            ))
            .execute(&self.pool)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?;

            // block_number index serves both queries and rollback purges
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS \"idx_{collection}_block\"
                 ON \"{collection}\" (block_number);"
            ))
            .execute(&self.pool)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?;
        }

        debug!(prefix, "schema bootstrapped");
        Ok(())
    }

    /// Delete every cursor row of one stream (CLI `reset`).
    pub async fn reset_stream(&self, stream_id: &str) -> Result<(), IngestError> {
        sqlx::query("DELETE FROM ingest_cursor WHERE stream_id = ?")
            .bind(stream_id)
            .execute(&self.pool)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?;
        Ok(())
    }
}

/// Payload column names per event kind — the ABI parameter names in
/// snake_case, matching what the batch sink emits.
fn payload_columns(kind: EventKind) -> &'static [&'static str] {
    match kind {
        EventKind::Transfer => &["from", "to", "value"],
        EventKind::Approval => &["owner", "spender", "value"],
        EventKind::DelegateChanged => &["delegator", "from_delegate", "to_delegate"],
        EventKind::DelegateVotesChanged => &["delegate", "previous_balance", "new_balance"],
        EventKind::Claim => &["claimant", "amount"],
        EventKind::MerkleRootChanged => &["merkle_root"],
        EventKind::OwnershipTransferred => &["previous_owner", "new_owner"],
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>;

fn bind_value(query: SqliteQuery<'_>, value: Value) -> SqliteQuery<'_> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(u) = n.as_u64() {
                query.bind(u as i64)
            } else {
                // Amounts travel as decimal strings; floats never occur.
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s),
        other => query.bind(other.to_string()),
    }
}

// ─── SinkStore impl ──────────────────────────────────────────────────────────

#[async_trait]
impl SinkStore for SqliteStore {
    async fn insert(&self, collection: &str, rows: Vec<Row>) -> Result<(), IngestError> {
        let Some(first) = rows.first() else {
            return Ok(());
        };

        // All rows of one partition share a kind, hence a column set.
        let columns: Vec<String> = first.keys().cloned().collect();
        let column_list = columns
            .iter()
            .map(|col| format!("\"{col}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let row_placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
        let placeholders = vec![row_placeholders; rows.len()].join(", ");

        let sql = format!("INSERT INTO \"{collection}\" ({column_list}) VALUES {placeholders}");
        let mut query = sqlx::query(&sql);
        for row in &rows {
            for column in &columns {
                query = bind_value(query, row.get(column).cloned().unwrap_or(Value::Null));
            }
        }

        query
            .execute(&self.pool)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?;

        debug!(collection, rows = rows.len(), "batch inserted");
        Ok(())
    }

    async fn delete_above(&self, collection: &str, block_number: u64) -> Result<(), IngestError> {
        sqlx::query(&format!(
            "DELETE FROM \"{collection}\" WHERE block_number > ?"
        ))
        .bind(block_number as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::Storage(e.to_string()))?;

        debug!(collection, block_number, "purged rows above bound");
        Ok(())
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, IngestError> {
        let row = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(collection)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IngestError::Storage(e.to_string()))?;

        Ok(row.is_some())
    }
}

// ─── CursorStore impl ────────────────────────────────────────────────────────

#[async_trait]
impl CursorStore for SqliteStore {
    async fn get(&self, stream_id: &str) -> Result<Option<Position>, IngestError> {
        let row = sqlx::query(
            "SELECT token, block_number, confirmed_at
             FROM ingest_cursor WHERE stream_id = ?
             ORDER BY confirmed_at DESC, rowid DESC LIMIT 1",
        )
        .bind(stream_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IngestError::Storage(e.to_string()))?;

        Ok(row.map(|r| Position {
            token: r.get("token"),
            block_number: r.get::<i64, _>("block_number") as u64,
            confirmed_at: r.get("confirmed_at"),
        }))
    }

    async fn set(
        &self,
        stream_id: &str,
        token: &str,
        block_number: u64,
    ) -> Result<(), IngestError> {
        // Upsert keyed by (stream_id, token) — never delete-then-insert,
        // so a crash mid-write cannot leave the stream positionless.
        sqlx::query(
            "INSERT OR REPLACE INTO ingest_cursor
             (stream_id, token, block_number, confirmed_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(stream_id)
        .bind(token)
        .bind(block_number as i64)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::Storage(e.to_string()))?;

        debug!(stream_id, block = block_number, "cursor committed");
        Ok(())
    }

    async fn resolve_token(&self, stream_id: &str, token: &str) -> Result<u64, IngestError> {
        let row = sqlx::query(
            "SELECT block_number FROM ingest_cursor
             WHERE stream_id = ? AND token = ? LIMIT 1",
        )
        .bind(stream_id)
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IngestError::Storage(e.to_string()))?;

        match row {
            Some(r) => Ok(r.get::<i64, _>("block_number") as u64),
            None => Err(IngestError::UnknownToken {
                token: token.to_string(),
            }),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
