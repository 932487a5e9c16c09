//! chainsink-stream — the upstream-facing half of the pipeline.
//!
//! [`BlockSource`] abstracts the chain-data provider behind a
//! subscribe-from-position call; [`StreamConsumer`] wraps it in a
//! reconnect loop with bounded exponential backoff, always resuming from
//! the last *committed* cursor position.

pub mod consumer;
pub mod retry;
pub mod source;

pub use consumer::{StreamConsumer, SubscriptionSpec};
pub use retry::{RetryConfig, RetryPolicy};
pub use source::{BlockSource, StartPosition, SubscribeRequest, UnitStream};
