//! Shared types for the ingestion pipeline.

use serde::{Deserialize, Serialize};

// ─── BlockRef ────────────────────────────────────────────────────────────────

/// A reference to the block an event was emitted in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    /// Block number.
    pub number: u64,
    /// Block hash (`0x…`).
    pub hash: String,
    /// Unix timestamp of the block (seconds since epoch).
    pub timestamp: i64,
}

// ─── TransactionRef ──────────────────────────────────────────────────────────

/// A reference to the transaction an event was emitted in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRef {
    /// Transaction hash (`0x…`).
    pub hash: String,
    /// Index of the transaction within its block.
    pub index: u32,
}

// ─── Envelope ────────────────────────────────────────────────────────────────

/// Fields shared by every decoded event.
///
/// `(transaction.hash, log_index)` is unique within a given chain state and
/// serves as the natural deduplication key under at-least-once delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Contract address that emitted the event (`0x…`, lowercase).
    pub contract_address: String,
    /// Block the event was emitted in.
    pub block: BlockRef,
    /// Transaction the event was emitted in.
    pub transaction: TransactionRef,
    /// Log index within the transaction.
    pub log_index: u32,
}

impl Envelope {
    /// Natural dedup key: `(transaction hash, log index)`.
    pub fn dedup_key(&self) -> (&str, u32) {
        (&self.transaction.hash, self.log_index)
    }
}

// ─── RawLog ──────────────────────────────────────────────────────────────────

/// A raw, undecoded log entry as delivered by the upstream source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLog {
    /// Emitting contract address (`0x…`).
    pub address: String,
    /// topics[0] is the event signature hash; topics[1..] are indexed params.
    pub topics: Vec<String>,
    /// ABI-encoded non-indexed parameters (`0x…` hex).
    pub data: String,
    /// Transaction hash.
    pub tx_hash: String,
    /// Transaction index within the block.
    pub tx_index: u32,
    /// Log index within the transaction.
    pub log_index: u32,
}

impl RawLog {
    /// topics[0], if present — the event signature hash.
    pub fn signature_topic(&self) -> Option<&str> {
        self.topics.first().map(|s| s.as_str())
    }
}

// ─── BlockGroup ──────────────────────────────────────────────────────────────

/// An ordered group of raw logs for one block, plus the resumption token
/// that committing this group confirms.
///
/// Zero-log groups are valid: they still flow through the cycle so the
/// cursor advances over empty blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockGroup {
    /// The block these logs belong to.
    pub block: BlockRef,
    /// Opaque resumption token for this delivery.
    pub token: String,
    /// Raw logs, in emission order.
    pub logs: Vec<RawLog>,
}

impl BlockGroup {
    /// Returns `true` if the group carries no logs (empty block).
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}

// ─── RollbackSignal ──────────────────────────────────────────────────────────

/// Emitted by the upstream when a reorg invalidates previously delivered
/// blocks above `last_valid_block`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackSignal {
    /// Highest block number that is still canonical.
    pub last_valid_block: u64,
    /// The resumption token corresponding to `last_valid_block`.
    pub last_valid_token: String,
}

// ─── StreamUnit ──────────────────────────────────────────────────────────────

/// The unit of delivery from the stream consumer: either a group of raw
/// logs, or a reorg notification.
#[derive(Debug, Clone)]
pub enum StreamUnit {
    /// A block's worth of raw logs.
    Group(BlockGroup),
    /// The upstream detected a reorg; rewind before continuing.
    Rollback(RollbackSignal),
}

// ─── Tests ───────────────────────────────────────────────────────────────────
