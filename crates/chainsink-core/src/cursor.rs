//! Cursor store — the durable resume position of a stream.
//!
//! A `Position` is an opaque resumption token plus the block number it
//! corresponds to. It is the only durable state the pipeline owns: written
//! on every successful cycle, read once at startup, rewound by rollback.
//!
//! `set` is an idempotent append keyed by `(stream id, token)` with
//! latest-confirmation-wins reads — never a delete-then-insert, so a crash
//! between writes can never leave a stream without any recorded position.
//! Historical token rows are retained so a rollback token can be resolved
//! back to its block number.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// A confirmed stream position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Opaque resumption token supplied by the upstream.
    pub token: String,
    /// Block number the token corresponds to.
    pub block_number: u64,
    /// Wall-clock confirmation time (milliseconds since epoch).
    pub confirmed_at: i64,
}

/// Durable mapping from stream identity to its last confirmed position.
///
/// Implementations include [`MemoryCursorStore`] and the SQLite store in
/// `chainsink-storage`.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// The most recently confirmed position for `stream_id`, if any.
    async fn get(&self, stream_id: &str) -> Result<Option<Position>, IngestError>;

    /// Confirm a new position. Idempotent: re-confirming the same
    /// `(token, block_number)` pair is a no-op in effect.
    async fn set(&self, stream_id: &str, token: &str, block_number: u64)
        -> Result<(), IngestError>;

    /// Translate a previously confirmed token back into its block number.
    ///
    /// Fails with [`IngestError::UnknownToken`] if the token was never
    /// confirmed by this store — a fatal condition, since the pipeline
    /// cannot safely guess a rollback depth.
    async fn resolve_token(&self, stream_id: &str, token: &str) -> Result<u64, IngestError>;
}

// ─── In-memory store (tests / ephemeral runs) ────────────────────────────────

use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory cursor store. All data is lost when the process exits.
#[derive(Default)]
pub struct MemoryCursorStore {
    /// stream id → confirmed positions, in confirmation order.
    rows: Mutex<HashMap<String, Vec<Position>>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn get(&self, stream_id: &str) -> Result<Option<Position>, IngestError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(stream_id)
            .and_then(|positions| positions.last().cloned()))
    }

    async fn set(
        &self,
        stream_id: &str,
        token: &str,
        block_number: u64,
    ) -> Result<(), IngestError> {
        let position = Position {
            token: token.to_string(),
            block_number,
            confirmed_at: chrono::Utc::now().timestamp_millis(),
        };
        let mut rows = self.rows.lock().unwrap();
        let positions = rows.entry(stream_id.to_string()).or_default();
        // Re-confirming an existing token moves it to the tail instead of
        // appending a duplicate row.
        positions.retain(|p| p.token != position.token);
        positions.push(position);
        Ok(())
    }

    async fn resolve_token(&self, stream_id: &str, token: &str) -> Result<u64, IngestError> {
        self.rows
            .lock()
            .unwrap()
            .get(stream_id)
            .and_then(|positions| positions.iter().find(|p| p.token == token))
            .map(|p| p.block_number)
            .ok_or_else(|| IngestError::UnknownToken {
                token: token.to_string(),
            })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
