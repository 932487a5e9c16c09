//! In-memory sink backend.
//!
//! Stores rows per collection in RAM. Useful for tests and short-lived
//! runs that don't need persistence. Collections must be registered up
//! front, mirroring the external bootstrap step of a real store.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chainsink_core::error::IngestError;
use chainsink_core::event::EventKind;
use chainsink_core::sink::{Row, SinkStore};

/// In-memory analytical store. All data is lost when the process exits.
#[derive(Default)]
pub struct MemorySink {
    registered: Mutex<HashSet<String>>,
    rows: Mutex<HashMap<String, Vec<Row>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink with every event collection under `prefix` pre-registered —
    /// the memory equivalent of a bootstrapped schema.
    pub fn bootstrapped(prefix: &str) -> Self {
        let sink = Self::new();
        for kind in EventKind::ALL {
            sink.register_collection(kind.collection(prefix));
        }
        sink
    }

    /// Register a collection so inserts into it are accepted.
    pub fn register_collection(&self, collection: impl Into<String>) {
        self.registered.lock().unwrap().insert(collection.into());
    }

    /// All rows currently held by `collection`.
    pub fn rows(&self, collection: &str) -> Vec<Row> {
        self.rows
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of rows across all collections.
    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().values().map(Vec::len).sum()
    }
}

fn row_block_number(row: &Row) -> u64 {
    row.get("block_number").and_then(|v| v.as_u64()).unwrap_or(0)
}

#[async_trait]
impl SinkStore for MemorySink {
    async fn insert(&self, collection: &str, rows: Vec<Row>) -> Result<(), IngestError> {
        if !self.registered.lock().unwrap().contains(collection) {
            return Err(IngestError::Storage(format!(
                "no such collection: {collection}"
            )));
        }
        self.rows
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .extend(rows);
        Ok(())
    }

    async fn delete_above(&self, collection: &str, block_number: u64) -> Result<(), IngestError> {
        if let Some(rows) = self.rows.lock().unwrap().get_mut(collection) {
            rows.retain(|row| row_block_number(row) <= block_number);
        }
        Ok(())
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, IngestError> {
        Ok(self.registered.lock().unwrap().contains(collection))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(block: u64) -> Row {
        match json!({ "block_number": block, "value": "1000" }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn insert_requires_registered_collection() {
        let sink = MemorySink::new();
        let err = sink.insert("evt_transfer", vec![row(100)]).await.unwrap_err();
        assert!(matches!(err, IngestError::Storage(_)));

        sink.register_collection("evt_transfer");
        sink.insert("evt_transfer", vec![row(100)]).await.unwrap();
        assert_eq!(sink.row_count(), 1);
    }

    #[tokio::test]
    async fn bootstrapped_registers_all_kinds() {
        let sink = MemorySink::bootstrapped("evt");
        for kind in EventKind::ALL {
            assert!(sink.collection_exists(&kind.collection("evt")).await.unwrap());
        }
        assert!(!sink.collection_exists("evt_unknown").await.unwrap());
    }

    #[tokio::test]
    async fn delete_above_purges_future_rows() {
        let sink = MemorySink::bootstrapped("evt");
        for block in 100..=105 {
            sink.insert("evt_transfer", vec![row(block)]).await.unwrap();
        }

        sink.delete_above("evt_transfer", 102).await.unwrap();

        let remaining = sink.rows("evt_transfer");
        assert_eq!(remaining.len(), 3); // 100, 101, 102 remain
        assert!(remaining.iter().all(|r| row_block_number(r) <= 102));
    }

    #[tokio::test]
    async fn delete_above_is_idempotent() {
        let sink = MemorySink::bootstrapped("evt");
        for block in 100..=105 {
            sink.insert("evt_transfer", vec![row(block)]).await.unwrap();
        }

        sink.delete_above("evt_transfer", 102).await.unwrap();
        let once = sink.rows("evt_transfer");
        sink.delete_above("evt_transfer", 102).await.unwrap();
        assert_eq!(sink.rows("evt_transfer"), once);
    }
}
