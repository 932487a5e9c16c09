//! Error types for the chainsink pipeline.

use thiserror::Error;

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Transport-level failure (connection refused, reset, broken stream).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Upstream read timed out.
    #[error("Timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Upstream is temporarily unavailable (transient RPC failure).
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    /// Missing or invalid credentials.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Malformed subscription request or unsupported module.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A target collection does not exist in the sink.
    #[error("Missing target collection: {collection}")]
    MissingCollection { collection: String },

    /// A rollback token was never confirmed by this cursor store.
    #[error("Unknown resumption token: {token}")]
    UnknownToken { token: String },

    /// Sink or cursor write failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A single log failed to decode against its matched signature.
    /// Confined to the decoder; never escapes a block group.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The pipeline was stopped cooperatively.
    #[error("Aborted: {reason}")]
    Aborted { reason: String },
}

impl IngestError {
    /// Returns `true` if the error is transient: backoff and reconnect
    /// from the last committed position.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout { .. } | Self::Unavailable(_)
        )
    }

    /// Returns `true` if the error must terminate the pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Auth(_)
                | Self::InvalidRequest(_)
                | Self::MissingCollection { .. }
                | Self::UnknownToken { .. }
        )
    }
}
