//! `StreamConsumer` — maintains the upstream connection and yields ordered
//! delivery units, reconnecting on transient failures.
//!
//! Every (re)connect reads the last **committed** position from the cursor
//! store — never an in-memory uncommitted one — so a crash or disconnect
//! mid-cycle replays the uncommitted block group instead of skipping it.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{info, warn};

use chainsink_core::cursor::{CursorStore, Position};
use chainsink_core::error::IngestError;
use chainsink_core::types::StreamUnit;

use crate::retry::RetryPolicy;
use crate::source::{BlockSource, StartPosition, SubscribeRequest, UnitStream};

/// Static parts of the subscription, re-sent on every reconnect.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSpec {
    /// First block for a cold start (no committed position).
    pub genesis_block: u64,
    /// Optional end block (bounded run).
    pub stop_block: Option<u64>,
    /// Contract addresses to filter on (empty = all).
    pub contracts: Vec<String>,
    /// topic0 values to filter on (empty = all).
    pub topics: Vec<String>,
}

/// Reconnecting consumer over a [`BlockSource`].
pub struct StreamConsumer {
    source: Arc<dyn BlockSource>,
    cursor: Arc<dyn CursorStore>,
    stream_id: String,
    spec: SubscriptionSpec,
    retry: RetryPolicy,
    stream: Option<UnitStream>,
    /// Consecutive failed attempts since the last successful unit.
    attempt: u32,
    reconnects: u64,
}

impl StreamConsumer {
    pub fn new(
        source: Arc<dyn BlockSource>,
        cursor: Arc<dyn CursorStore>,
        stream_id: impl Into<String>,
        spec: SubscriptionSpec,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            cursor,
            stream_id: stream_id.into(),
            spec,
            retry,
            stream: None,
            attempt: 0,
            reconnects: 0,
        }
    }

    /// Pull the next delivery unit, reconnecting as needed.
    ///
    /// Returns `Ok(None)` when the upstream completes (bounded run).
    /// Retryable errors are absorbed here up to the retry budget; fatal
    /// errors and an exhausted budget escape to the caller.
    pub async fn next(&mut self) -> Result<Option<StreamUnit>, IngestError> {
        loop {
            if self.stream.is_none() {
                match self.connect().await {
                    Ok(stream) => self.stream = Some(stream),
                    Err(e) => {
                        self.backoff_or_bail(e).await?;
                        continue;
                    }
                }
            }

            let Some(stream) = self.stream.as_mut() else {
                continue;
            };
            match stream.next().await {
                Some(Ok(unit)) => {
                    self.attempt = 0;
                    return Ok(Some(unit));
                }
                Some(Err(e)) => {
                    self.stream = None;
                    self.backoff_or_bail(e).await?;
                }
                None => {
                    info!(stream_id = %self.stream_id, "Upstream stream completed");
                    self.stream = None;
                    return Ok(None);
                }
            }
        }
    }

    /// Drop the current upstream connection so the next [`Self::next`]
    /// call reconnects from the last committed position. Called by the
    /// orchestrator after a rollback commit.
    pub fn reset(&mut self) {
        self.stream = None;
    }

    /// Forward confirmed progress to the upstream.
    pub async fn acknowledge(&self, position: &Position) -> Result<(), IngestError> {
        self.source.acknowledge(position).await
    }

    /// Number of reconnects performed since construction.
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    async fn connect(&mut self) -> Result<UnitStream, IngestError> {
        let start = match self.cursor.get(&self.stream_id).await? {
            Some(position) => {
                info!(
                    stream_id = %self.stream_id,
                    block = position.block_number,
                    "Resuming from committed position"
                );
                StartPosition::Resume(position)
            }
            None => {
                info!(
                    stream_id = %self.stream_id,
                    block = self.spec.genesis_block,
                    "No committed position, starting from genesis block"
                );
                StartPosition::Block(self.spec.genesis_block)
            }
        };

        self.source
            .subscribe(SubscribeRequest {
                start,
                stop_block: self.spec.stop_block,
                contracts: self.spec.contracts.clone(),
                topics: self.spec.topics.clone(),
            })
            .await
    }

    async fn backoff_or_bail(&mut self, error: IngestError) -> Result<(), IngestError> {
        if !error.is_retryable() {
            return Err(error);
        }
        self.attempt += 1;
        match self.retry.next_delay(self.attempt) {
            Some(delay) => {
                warn!(
                    stream_id = %self.stream_id,
                    attempt = self.attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retryable stream error, reconnecting after backoff"
                );
                self.reconnects += 1;
                tokio::time::sleep(delay).await;
                Ok(())
            }
            None => {
                warn!(stream_id = %self.stream_id, error = %error, "Retry budget exhausted");
                Err(error)
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryConfig;
    use async_trait::async_trait;
    use chainsink_core::cursor::MemoryCursorStore;
    use chainsink_core::types::{BlockGroup, BlockRef};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn group(number: u64) -> BlockGroup {
        BlockGroup {
            block: BlockRef {
                number,
                hash: format!("0x{number:x}"),
                timestamp: number as i64 * 12,
            },
            token: format!("tok-{number}"),
            logs: vec![],
        }
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            multiplier: 2.0,
        })
    }

    fn genesis(block: u64) -> SubscriptionSpec {
        SubscriptionSpec {
            genesis_block: block,
            ..Default::default()
        }
    }

    /// Scripted source: fails the first `fail_connects` subscribes with a
    /// retryable error, then serves one group per subscribe starting at
    /// the requested block. Records every requested start block.
    struct ScriptedSource {
        fail_connects: AtomicU32,
        starts: Mutex<Vec<u64>>,
    }

    impl ScriptedSource {
        fn new(fail_connects: u32) -> Self {
            Self {
                fail_connects: AtomicU32::new(fail_connects),
                starts: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl BlockSource for ScriptedSource {
        async fn subscribe(&self, request: SubscribeRequest) -> Result<UnitStream, IngestError> {
            let start = request.start.start_block();
            self.starts.lock().unwrap().push(start);
            if self
                .fail_connects
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(IngestError::Transport("connection refused".into()));
            }
            Ok(Box::pin(futures::stream::iter(vec![Ok(
                StreamUnit::Group(group(start)),
            )])))
        }
    }

    struct FatalSource;

    #[async_trait]
    impl BlockSource for FatalSource {
        async fn subscribe(&self, _request: SubscribeRequest) -> Result<UnitStream, IngestError> {
            Err(IngestError::Auth("missing upstream token".into()))
        }
    }

    #[tokio::test]
    async fn reconnects_after_retryable_connect_errors() {
        let source = Arc::new(ScriptedSource::new(2));
        let cursor = Arc::new(MemoryCursorStore::new());
        let mut consumer =
            StreamConsumer::new(source.clone(), cursor, "s1", genesis(100), fast_retry(5));

        let unit = consumer.next().await.unwrap().unwrap();
        match unit {
            StreamUnit::Group(g) => assert_eq!(g.block.number, 100),
            other => panic!("expected group, got {other:?}"),
        }
        assert_eq!(consumer.reconnects(), 2);
        assert_eq!(source.starts.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn resumes_from_committed_cursor_not_genesis() {
        let source = Arc::new(ScriptedSource::new(0));
        let cursor = Arc::new(MemoryCursorStore::new());
        cursor.set("s1", "tok-150", 150).await.unwrap();

        let mut consumer =
            StreamConsumer::new(source.clone(), cursor, "s1", genesis(100), fast_retry(5));

        consumer.next().await.unwrap().unwrap();
        assert_eq!(source.starts.lock().unwrap().as_slice(), &[151]);
    }

    #[tokio::test]
    async fn fatal_connect_error_escapes() {
        let cursor = Arc::new(MemoryCursorStore::new());
        let mut consumer =
            StreamConsumer::new(Arc::new(FatalSource), cursor, "s1", genesis(100), fast_retry(5));

        let err = consumer.next().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn retry_budget_exhaustion_escapes() {
        let source = Arc::new(ScriptedSource::new(10));
        let cursor = Arc::new(MemoryCursorStore::new());
        let mut consumer = StreamConsumer::new(source, cursor, "s1", genesis(100), fast_retry(2));

        let err = consumer.next().await.unwrap_err();
        assert!(err.is_retryable(), "the original classification survives");
    }

    #[tokio::test]
    async fn mid_stream_error_triggers_reconnect_from_cursor() {
        /// Serves a group, then a retryable error; the reconnect must ask
        /// for the block after the committed one.
        struct FlakyTail {
            starts: Mutex<Vec<u64>>,
        }

        #[async_trait]
        impl BlockSource for FlakyTail {
            async fn subscribe(&self, request: SubscribeRequest) -> Result<UnitStream, IngestError> {
                let start = request.start.start_block();
                self.starts.lock().unwrap().push(start);
                Ok(Box::pin(futures::stream::iter(vec![
                    Ok(StreamUnit::Group(group(start))),
                    Err(IngestError::Transport("stream reset".into())),
                ])))
            }
        }

        let source = Arc::new(FlakyTail { starts: Mutex::new(vec![]) });
        let cursor = Arc::new(MemoryCursorStore::new());
        let mut consumer = StreamConsumer::new(
            source.clone(),
            cursor.clone(),
            "s1",
            genesis(100),
            fast_retry(5),
        );

        // First unit from genesis; commit it the way the orchestrator would.
        consumer.next().await.unwrap().unwrap();
        cursor.set("s1", "tok-100", 100).await.unwrap();

        // The tail error forces a reconnect, which must resume at 101.
        consumer.next().await.unwrap().unwrap();
        assert_eq!(source.starts.lock().unwrap().as_slice(), &[100, 101]);
    }
}
