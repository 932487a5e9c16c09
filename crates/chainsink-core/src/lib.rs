//! chainsink-core — foundation for the reorg-safe event-ingestion pipeline.
//!
//! # Architecture
//!
//! ```text
//! PipelineBuilder → Pipeline
//!                      ├── StreamConsumer   (reconnect/backoff, resume from cursor)
//!                      ├── EventDecoder     (closed set of event kinds)
//!                      ├── BatchSink        (per-kind partitions, joined writes)
//!                      ├── RollbackHandler  (purge above bound, rewind cursor)
//!                      └── CursorStore      (durable resume position)
//! ```
//!
//! This crate holds the shared types, the decoder, and the storage-facing
//! traits. Backends live in `chainsink-storage`; the consumer and the
//! orchestration loop live in `chainsink-stream` and `chainsink-pipeline`.

pub mod cursor;
pub mod decoder;
pub mod error;
pub mod event;
pub mod sink;
pub mod snake;
pub mod types;

pub use cursor::{CursorStore, MemoryCursorStore, Position};
pub use decoder::EventDecoder;
pub use error::IngestError;
pub use event::{Event, EventKind, EventPayload};
pub use sink::{BatchSink, Row, SinkStore};
pub use types::{BlockGroup, BlockRef, Envelope, RawLog, RollbackSignal, StreamUnit, TransactionRef};
