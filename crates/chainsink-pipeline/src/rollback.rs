//! Rollback handler — undoes ingested data above a reorg boundary.
//!
//! The purge bound is the block number, consistently: block numbers are
//! strictly ordered within a branch, while timestamps need not be
//! monotonic across reorganized branches. `delete where block_number >
//! bound` is monotone and therefore idempotent — re-invoking after a
//! crash mid-rollback produces the same end state.

use std::sync::Arc;

use tracing::{info, warn};

use chainsink_core::cursor::CursorStore;
use chainsink_core::error::IngestError;
use chainsink_core::sink::SinkStore;
use chainsink_core::types::RollbackSignal;

/// Purges stale rows and rewinds the cursor on a reorg signal.
pub struct RollbackHandler {
    store: Arc<dyn SinkStore>,
    cursor: Arc<dyn CursorStore>,
    stream_id: String,
    /// Every collection owned by this pipeline.
    collections: Vec<String>,
}

impl RollbackHandler {
    pub fn new(
        store: Arc<dyn SinkStore>,
        cursor: Arc<dyn CursorStore>,
        stream_id: impl Into<String>,
        collections: Vec<String>,
    ) -> Self {
        Self {
            store,
            cursor,
            stream_id: stream_id.into(),
            collections,
        }
    }

    /// Handle one reorg signal.
    ///
    /// Resolves the signal's token against the cursor store (fatal if it
    /// was never confirmed — the pipeline cannot safely guess a rollback
    /// depth), purges **every** owned collection above the resolved block,
    /// and only then rewinds the cursor, so a crash between the two phases
    /// leaves re-runnable purges rather than undetected stale rows.
    pub async fn rollback(&self, signal: &RollbackSignal) -> Result<(), IngestError> {
        if self.cursor.get(&self.stream_id).await?.is_none() {
            // Fresh stream: nothing committed, nothing to undo.
            info!(stream_id = %self.stream_id, "Rollback on fresh stream is a no-op");
            return Ok(());
        }

        let resolved = self
            .cursor
            .resolve_token(&self.stream_id, &signal.last_valid_token)
            .await?;
        if resolved != signal.last_valid_block {
            warn!(
                signal_block = signal.last_valid_block,
                resolved,
                "Rollback signal block differs from resolved token; using resolved"
            );
        }

        info!(
            stream_id = %self.stream_id,
            last_valid_block = resolved,
            "Reorg detected, purging rows above bound"
        );

        for collection in &self.collections {
            self.store.delete_above(collection, resolved).await?;
        }

        self.cursor
            .set(&self.stream_id, &signal.last_valid_token, resolved)
            .await?;

        info!(stream_id = %self.stream_id, block = resolved, "Rollback complete");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chainsink_core::cursor::MemoryCursorStore;
    use chainsink_core::event::EventKind;
    use chainsink_core::sink::Row;
    use chainsink_storage::MemorySink;
    use serde_json::json;

    fn row(block: u64) -> Row {
        match json!({ "block_number": block }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn collections() -> Vec<String> {
        EventKind::ALL.iter().map(|k| k.collection("evt")).collect()
    }

    async fn seeded() -> (Arc<MemorySink>, Arc<MemoryCursorStore>, RollbackHandler) {
        let sink = Arc::new(MemorySink::bootstrapped("evt"));
        let cursor = Arc::new(MemoryCursorStore::new());
        for block in [100u64, 110, 120, 130, 150] {
            sink.insert("evt_transfer", vec![row(block)]).await.unwrap();
            sink.insert("evt_approval", vec![row(block)]).await.unwrap();
            cursor
                .set("s1", &format!("tok-{block}"), block)
                .await
                .unwrap();
        }
        let handler = RollbackHandler::new(sink.clone(), cursor.clone(), "s1", collections());
        (sink, cursor, handler)
    }

    fn signal(block: u64) -> RollbackSignal {
        RollbackSignal {
            last_valid_block: block,
            last_valid_token: format!("tok-{block}"),
        }
    }

    #[tokio::test]
    async fn purges_all_collections_and_rewinds_cursor() {
        let (sink, cursor, handler) = seeded().await;

        handler.rollback(&signal(120)).await.unwrap();

        // 100, 110, 120 remain in every owned collection.
        assert_eq!(sink.rows("evt_transfer").len(), 3);
        assert_eq!(sink.rows("evt_approval").len(), 3);

        let pos = cursor.get("s1").await.unwrap().unwrap();
        assert_eq!(pos.block_number, 120);
        assert_eq!(pos.token, "tok-120");
    }

    #[tokio::test]
    async fn rollback_twice_matches_rollback_once() {
        let (sink, cursor, handler) = seeded().await;

        handler.rollback(&signal(120)).await.unwrap();
        let rows_once = sink.rows("evt_transfer");
        let pos_once = cursor.get("s1").await.unwrap().unwrap();

        handler.rollback(&signal(120)).await.unwrap();
        assert_eq!(sink.rows("evt_transfer"), rows_once);
        assert_eq!(
            cursor.get("s1").await.unwrap().unwrap().block_number,
            pos_once.block_number
        );
    }

    #[tokio::test]
    async fn fresh_stream_is_a_noop() {
        let sink = Arc::new(MemorySink::bootstrapped("evt"));
        let cursor = Arc::new(MemoryCursorStore::new());
        let handler = RollbackHandler::new(sink, cursor.clone(), "s1", collections());

        handler.rollback(&signal(120)).await.unwrap();
        assert!(cursor.get("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_token_is_fatal_and_leaves_data_untouched() {
        let (sink, _cursor, handler) = seeded().await;

        let err = handler
            .rollback(&RollbackSignal {
                last_valid_block: 115,
                last_valid_token: "tok-unseen".into(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::UnknownToken { .. }));
        assert!(err.is_fatal());
        // No purge happened without a resolvable bound.
        assert_eq!(sink.rows("evt_transfer").len(), 5);
    }
}
