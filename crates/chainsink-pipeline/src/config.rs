//! Pipeline configuration.

use serde::{Deserialize, Serialize};

use chainsink_stream::RetryConfig;

/// Configuration for one pipeline instance.
///
/// One logical worker per stream id: concurrent pipelines against the
/// same identity are not supported and would corrupt cursor ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Stream identity (cursor key).
    pub stream_id: String,
    /// First block to ingest when no position has been committed yet.
    pub genesis_block: u64,
    /// Optional end block (bounded run). `None` = stream forever.
    pub stop_block: Option<u64>,
    /// Contract addresses to subscribe to (empty = all).
    pub contracts: Vec<String>,
    /// Collection name prefix, e.g. `evt` → `evt_transfer`.
    pub collection_prefix: String,
    /// Reconnect backoff settings.
    pub retry: RetryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stream_id: "default".into(),
            genesis_block: 0,
            stop_block: None,
            contracts: vec![],
            collection_prefix: "evt".into(),
            retry: RetryConfig::default(),
        }
    }
}
