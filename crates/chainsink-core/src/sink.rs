//! Batch sink — partitions decoded events by kind and writes each
//! partition to its target collection.
//!
//! The sink performs no retries: a failed write surfaces verbatim to the
//! orchestrator, which reprocesses from the last committed cursor. All
//! non-empty partitions are written concurrently and joined; a single
//! partition's failure fails the whole write.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::Value;

use crate::error::IngestError;
use crate::event::{Event, EventKind};
use crate::snake::to_snake_case;

/// One sink row: canonical snake_case column names → JSON values.
pub type Row = serde_json::Map<String, Value>;

/// Backend interface to the analytical store.
///
/// Implementations include the memory and SQLite stores in
/// `chainsink-storage`. Collections and the cursor table are pre-created
/// by an external bootstrap step; the pipeline only verifies they exist.
#[async_trait]
pub trait SinkStore: Send + Sync {
    /// Insert `rows` into `collection` as one batch.
    async fn insert(&self, collection: &str, rows: Vec<Row>) -> Result<(), IngestError>;

    /// Delete every row of `collection` whose block number exceeds
    /// `block_number`. Idempotent by construction.
    async fn delete_above(&self, collection: &str, block_number: u64) -> Result<(), IngestError>;

    /// Returns `true` if `collection` exists in the store.
    async fn collection_exists(&self, collection: &str) -> Result<bool, IngestError>;
}

/// Writes decoded events to one collection per event kind.
pub struct BatchSink {
    store: Arc<dyn SinkStore>,
    prefix: String,
}

impl BatchSink {
    pub fn new(store: Arc<dyn SinkStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// The collections this sink owns, in stable order.
    pub fn collections(&self) -> Vec<String> {
        EventKind::ALL
            .iter()
            .map(|kind| kind.collection(&self.prefix))
            .collect()
    }

    /// Fail fast if any owned collection is missing from the store.
    pub async fn ensure_collections(&self) -> Result<(), IngestError> {
        for collection in self.collections() {
            if !self.store.collection_exists(&collection).await? {
                return Err(IngestError::MissingCollection { collection });
            }
        }
        Ok(())
    }

    /// Write a decoded event set.
    ///
    /// Events are partitioned by kind; empty partitions issue no store
    /// call. Non-empty partitions are inserted concurrently and joined —
    /// the write returns only after all of them have completed, and no
    /// partial set of partitions is treated as committed.
    pub async fn write(&self, events: &[Event]) -> Result<(), IngestError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut partitions: HashMap<EventKind, Vec<Row>> = HashMap::new();
        for event in events {
            partitions
                .entry(event.kind())
                .or_default()
                .push(event_row(event));
        }

        let writes = partitions.into_iter().map(|(kind, rows)| {
            let collection = kind.collection(&self.prefix);
            let count = rows.len();
            let store = Arc::clone(&self.store);
            async move {
                store.insert(&collection, rows).await?;
                tracing::debug!(collection = %collection, rows = count, "partition written");
                Ok::<(), IngestError>(())
            }
        });

        try_join_all(writes).await?;
        Ok(())
    }
}

/// Render one event as a sink row.
///
/// Envelope columns are fixed; payload columns are the ABI parameter
/// names normalized to snake_case at this boundary.
pub fn event_row(event: &Event) -> Row {
    let envelope = &event.envelope;
    let mut row = Row::new();
    row.insert("contract_address".into(), envelope.contract_address.clone().into());
    row.insert("block_number".into(), envelope.block.number.into());
    row.insert("block_hash".into(), envelope.block.hash.clone().into());
    row.insert("block_timestamp".into(), envelope.block.timestamp.into());
    row.insert("transaction_hash".into(), envelope.transaction.hash.clone().into());
    row.insert("transaction_index".into(), envelope.transaction.index.into());
    row.insert("log_index".into(), envelope.log_index.into());

    for (name, value) in event.payload.abi_fields() {
        row.insert(to_snake_case(name), value);
    }
    row
}

// ─── Tests ───────────────────────────────────────────────────────────────────
