//! The orchestration loop — drives consume → decode → write → acknowledge
//! cycles and routes reorg signals to the rollback handler.
//!
//! One cycle owns its transient objects (block group, decoded event set);
//! the only durable state is the cursor position, committed strictly after
//! a successful write. A write failure aborts the cycle without
//! committing, so a restart reprocesses the same block group — duplicates
//! are tolerated downstream via the `(transaction_hash, log_index)`
//! natural key.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use chainsink_core::cursor::{CursorStore, Position};
use chainsink_core::decoder::EventDecoder;
use chainsink_core::error::IngestError;
use chainsink_core::sink::BatchSink;
use chainsink_core::types::{BlockGroup, RollbackSignal, StreamUnit};
use chainsink_stream::StreamConsumer;

use crate::config::PipelineConfig;
use crate::rollback::RollbackHandler;

/// The orchestrator's current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Loading the resume position.
    Init,
    /// Waiting on the next delivery unit.
    Streaming,
    /// Decoding a block group.
    Decoding,
    /// Writing decoded events to the sink.
    Writing,
    /// Committing the cursor and acknowledging upstream.
    Acknowledging,
    /// Handling a reorg signal.
    RollingBack,
    /// Clean exit (stop signal or bounded run complete).
    Stopped,
    /// Terminated by a non-retryable error.
    Failed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Streaming => write!(f, "streaming"),
            Self::Decoding => write!(f, "decoding"),
            Self::Writing => write!(f, "writing"),
            Self::Acknowledging => write!(f, "acknowledging"),
            Self::RollingBack => write!(f, "rolling-back"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Counters exposed for observability.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineStats {
    /// Block groups processed (including empty ones).
    pub groups: u64,
    /// Block groups that decoded to zero events.
    pub empty_groups: u64,
    /// Events written to the sink.
    pub events: u64,
    /// Rollbacks handled.
    pub rollbacks: u64,
    /// Upstream reconnects performed by the consumer.
    pub reconnects: u64,
}

/// One ingestion pipeline: a single logical worker for one stream id.
pub struct Pipeline {
    config: PipelineConfig,
    consumer: StreamConsumer,
    decoder: EventDecoder,
    sink: BatchSink,
    rollback: RollbackHandler,
    cursor: Arc<dyn CursorStore>,
    shutdown: watch::Receiver<bool>,
    state: PipelineState,
    stats: PipelineStats,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub(crate) fn new(
        config: PipelineConfig,
        consumer: StreamConsumer,
        decoder: EventDecoder,
        sink: BatchSink,
        rollback: RollbackHandler,
        cursor: Arc<dyn CursorStore>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            consumer,
            decoder,
            sink,
            rollback,
            cursor,
            shutdown,
            state: PipelineState::Init,
            stats: PipelineStats::default(),
        }
    }

    /// The orchestrator's current phase.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Snapshot of the run counters.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            reconnects: self.consumer.reconnects(),
            ..self.stats
        }
    }

    /// Run until the upstream completes, a stop is signalled, or a
    /// non-retryable error occurs.
    ///
    /// Retryable stream errors are handled inside the consumer and are
    /// invisible here except as a pause in unit delivery.
    pub async fn run(&mut self) -> Result<(), IngestError> {
        match self.run_inner().await {
            Ok(()) => {
                self.state = PipelineState::Stopped;
                info!(stream_id = %self.config.stream_id, stats = ?self.stats(), "Pipeline stopped");
                Ok(())
            }
            Err(e) => {
                self.state = PipelineState::Failed;
                Err(e)
            }
        }
    }

    async fn run_inner(&mut self) -> Result<(), IngestError> {
        self.state = PipelineState::Init;
        self.sink.ensure_collections().await?;

        match self.cursor.get(&self.config.stream_id).await? {
            Some(position) => info!(
                stream_id = %self.config.stream_id,
                block = position.block_number,
                "Pipeline starting from committed position"
            ),
            None => info!(
                stream_id = %self.config.stream_id,
                block = self.config.genesis_block,
                "Pipeline starting from genesis block"
            ),
        }

        let mut shutdown = self.shutdown.clone();
        loop {
            // Stop only between cycles: the committed position always
            // reflects fully applied work. While waiting on the next unit
            // the stop signal races the upstream read; mid-cycle it is
            // never observed.
            if *shutdown.borrow() {
                info!(stream_id = %self.config.stream_id, "Stop signalled, exiting between cycles");
                return Ok(());
            }

            self.state = PipelineState::Streaming;
            let next = tokio::select! {
                () = wait_for_stop(&mut shutdown) => {
                    info!(stream_id = %self.config.stream_id, "Stop signalled, exiting between cycles");
                    return Ok(());
                }
                next = self.consumer.next() => next?,
            };
            let unit = match next {
                Some(unit) => unit,
                None => return Ok(()),
            };

            match unit {
                StreamUnit::Group(group) => self.process_group(group).await?,
                StreamUnit::Rollback(signal) => self.process_rollback(signal).await?,
            }
        }
    }

    async fn process_group(&mut self, group: BlockGroup) -> Result<(), IngestError> {
        self.state = PipelineState::Decoding;
        let events = self.decoder.decode_group(&group);

        if events.is_empty() {
            self.stats.empty_groups += 1;
        } else {
            self.state = PipelineState::Writing;
            self.sink.write(&events).await?;
        }

        self.state = PipelineState::Acknowledging;
        self.cursor
            .set(&self.config.stream_id, &group.token, group.block.number)
            .await?;

        let position = Position {
            token: group.token.clone(),
            block_number: group.block.number,
            confirmed_at: chrono::Utc::now().timestamp_millis(),
        };
        // The committed cursor is the source of truth; a failed upstream
        // ack costs at most a replay, so it does not abort the cycle.
        if let Err(e) = self.consumer.acknowledge(&position).await {
            warn!(error = %e, "Failed to acknowledge progress upstream");
        }

        self.stats.groups += 1;
        self.stats.events += events.len() as u64;
        debug!(
            block = group.block.number,
            events = events.len(),
            "Cycle committed"
        );
        Ok(())
    }

    async fn process_rollback(&mut self, signal: RollbackSignal) -> Result<(), IngestError> {
        self.state = PipelineState::RollingBack;
        self.rollback.rollback(&signal).await?;
        // Reopen the upstream from the rewound position.
        self.consumer.reset();
        self.stats.rollbacks += 1;
        Ok(())
    }
}

/// Resolves once the stop flag is raised. If the sender side is gone the
/// flag can never be raised again, so the future stays pending instead of
/// spinning on the closed channel.
async fn wait_for_stop(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}
