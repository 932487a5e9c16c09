//! Fluent builder API for assembling a pipeline.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chainsink_pipeline::PipelineBuilder;
//! # use chainsink_core::cursor::MemoryCursorStore;
//! # use chainsink_storage::MemorySink;
//! # fn demo(source: Arc<dyn chainsink_stream::BlockSource>) {
//! let pipeline = PipelineBuilder::new()
//!     .stream_id("ens-events")
//!     .genesis_block(23_314_199)
//!     .contract("0xC18360217D8F7Ab5e7c516566761Ea12Ce7F9D72")
//!     .source(source)
//!     .store(Arc::new(MemorySink::bootstrapped("evt")))
//!     .cursor(Arc::new(MemoryCursorStore::new()))
//!     .build()
//!     .unwrap();
//! # let _ = pipeline;
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::watch;

use chainsink_core::cursor::CursorStore;
use chainsink_core::decoder::EventDecoder;
use chainsink_core::error::IngestError;
use chainsink_core::sink::{BatchSink, SinkStore};
use chainsink_stream::{
    BlockSource, RetryConfig, RetryPolicy, StreamConsumer, SubscriptionSpec,
};

use crate::config::PipelineConfig;
use crate::orchestrator::Pipeline;
use crate::rollback::RollbackHandler;

/// Fluent builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    source: Option<Arc<dyn BlockSource>>,
    store: Option<Arc<dyn SinkStore>>,
    cursor: Option<Arc<dyn CursorStore>>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the stream identity (cursor key).
    pub fn stream_id(mut self, id: impl Into<String>) -> Self {
        self.config.stream_id = id.into();
        self
    }

    /// Set the cold-start block.
    pub fn genesis_block(mut self, block: u64) -> Self {
        self.config.genesis_block = block;
        self
    }

    /// Set an end block for a bounded run.
    pub fn stop_block(mut self, block: u64) -> Self {
        self.config.stop_block = Some(block);
        self
    }

    /// Add a contract address to the subscription filter.
    pub fn contract(mut self, address: impl Into<String>) -> Self {
        self.config.contracts.push(address.into());
        self
    }

    /// Set the collection name prefix.
    pub fn collection_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.collection_prefix = prefix.into();
        self
    }

    /// Set the reconnect backoff settings.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the upstream block source.
    pub fn source(mut self, source: Arc<dyn BlockSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the analytical sink backend.
    pub fn store(mut self, store: Arc<dyn SinkStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the cursor store.
    pub fn cursor(mut self, cursor: Arc<dyn CursorStore>) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Install an external stop signal, honored between cycles.
    pub fn shutdown(mut self, receiver: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(receiver);
        self
    }

    /// Assemble the pipeline.
    pub fn build(self) -> Result<Pipeline, IngestError> {
        let source = self
            .source
            .ok_or_else(|| IngestError::InvalidRequest("pipeline requires a block source".into()))?;
        let store = self
            .store
            .ok_or_else(|| IngestError::InvalidRequest("pipeline requires a sink store".into()))?;
        let cursor = self
            .cursor
            .ok_or_else(|| IngestError::InvalidRequest("pipeline requires a cursor store".into()))?;

        let config = self.config;
        let decoder = EventDecoder::new();
        let sink = BatchSink::new(Arc::clone(&store), config.collection_prefix.as_str());

        let rollback = RollbackHandler::new(
            Arc::clone(&store),
            Arc::clone(&cursor),
            config.stream_id.as_str(),
            sink.collections(),
        );

        let consumer = StreamConsumer::new(
            source,
            Arc::clone(&cursor),
            config.stream_id.as_str(),
            SubscriptionSpec {
                genesis_block: config.genesis_block,
                stop_block: config.stop_block,
                contracts: config.contracts.clone(),
                topics: decoder.topics(),
            },
            RetryPolicy::new(config.retry.clone()),
        );

        let shutdown = match self.shutdown {
            Some(receiver) => receiver,
            None => {
                // No external stop signal: a receiver whose sender is gone
                // keeps reporting the initial `false`.
                let (_tx, rx) = watch::channel(false);
                rx
            }
        };

        Ok(Pipeline::new(
            config, consumer, decoder, sink, rollback, cursor, shutdown,
        ))
    }
}
