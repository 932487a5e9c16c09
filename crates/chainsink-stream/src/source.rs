//! `BlockSource` trait — abstraction over the upstream chain-data provider.
//!
//! A source is opened with a subscribe-from-position request and yields an
//! ordered stream of [`StreamUnit`]s: block groups of raw logs, or reorg
//! signals. Transport concerns (gRPC, WebSocket, …) live entirely behind
//! this trait.

use async_trait::async_trait;
use chainsink_core::cursor::Position;
use chainsink_core::error::IngestError;
use chainsink_core::types::StreamUnit;
use futures::Stream;
use std::pin::Pin;

/// A stream of delivery units from one upstream connection.
pub type UnitStream = Pin<Box<dyn Stream<Item = Result<StreamUnit, IngestError>> + Send>>;

/// Where to start (or resume) consumption.
#[derive(Debug, Clone)]
pub enum StartPosition {
    /// Cold start from an explicit block number.
    Block(u64),
    /// Resume from a previously committed position.
    Resume(Position),
}

impl StartPosition {
    /// The first block the subscription should deliver.
    pub fn start_block(&self) -> u64 {
        match self {
            Self::Block(number) => *number,
            Self::Resume(position) => position.block_number + 1,
        }
    }
}

/// Parameters of a subscribe-from-position call.
#[derive(Debug, Clone)]
pub struct SubscribeRequest {
    /// Start or resume point.
    pub start: StartPosition,
    /// Optional end block (bounded run). `None` = stream forever.
    pub stop_block: Option<u64>,
    /// Contract addresses to filter on (empty = all).
    pub contracts: Vec<String>,
    /// topic0 values to filter on (empty = all).
    pub topics: Vec<String>,
}

/// Abstracts over upstream chain-data providers.
///
/// Authentication failures and malformed subscription requests must be
/// reported as fatal errors ([`IngestError::Auth`],
/// [`IngestError::InvalidRequest`]); transport failures as retryable ones.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Open the upstream stream from the requested position.
    async fn subscribe(&self, request: SubscribeRequest) -> Result<UnitStream, IngestError>;

    /// Inform the upstream of confirmed progress, where its protocol
    /// supports it. The default implementation is a no-op.
    async fn acknowledge(&self, _position: &Position) -> Result<(), IngestError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_block_from_cold_start() {
        assert_eq!(StartPosition::Block(23_314_199).start_block(), 23_314_199);
    }

    #[test]
    fn resume_starts_after_committed_block() {
        let pos = Position {
            token: "tok-120".into(),
            block_number: 120,
            confirmed_at: 0,
        };
        assert_eq!(StartPosition::Resume(pos).start_block(), 121);
    }
}
