//! Sharded batch processing loop shared across all input modes.
//!
//! One reader pulls batches from a [`BatchSource`] and routes each to an
//! ingest worker chosen by key hash. A key always lands on the same worker,
//! so its batches are processed in arrival order, while different keys are
//! spread across workers and run in parallel.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::source::{BatchEvent, BatchSource};
use super::PipelineCoordinator;
use crate::config::IngestConfig;
use crate::types::{RawBatch, SensorKey};

/// Totals reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub batches_read: u64,
    /// Batches routed to a worker (equal to `batches_read` unless cancelled
    /// mid-send)
    pub batches_dispatched: u64,
}

/// Worker index for `key` among `workers` shards.
pub fn shard_for(key: &SensorKey, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % workers.max(1) as u64) as usize
}

pub struct ProcessingLoop {
    coordinator: Arc<PipelineCoordinator>,
    workers: usize,
    channel_capacity: usize,
    cancel_token: CancellationToken,
}

impl ProcessingLoop {
    pub fn new(coordinator: Arc<PipelineCoordinator>, config: &IngestConfig, cancel_token: CancellationToken) -> Self {
        Self {
            coordinator,
            workers: config.workers.max(1),
            channel_capacity: config.channel_capacity.max(1),
            cancel_token,
        }
    }

    /// Run until the source is exhausted, fails, or cancellation fires.
    ///
    /// Batches already routed to a worker are still processed; the call
    /// returns once every worker has drained its channel.
    pub async fn run<S: BatchSource>(self, source: &mut S) -> LoopSummary {
        let (senders, handles) = self.spawn_workers();
        let mut summary = LoopSummary::default();

        info!(
            source = source.source_name(),
            workers = self.workers,
            "Processing raw vibration batches"
        );

        loop {
            let event = tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!("[ProcessingLoop] Shutdown signal received");
                    break;
                }
                result = source.next_batch() => match result {
                    Ok(ev) => ev,
                    Err(e) => {
                        warn!(error = %e, "[ProcessingLoop] Source error");
                        break;
                    }
                },
            };

            let (key, batch) = match event {
                BatchEvent::Batch(key, batch) => (key, batch),
                BatchEvent::Eof => {
                    info!(batches = summary.batches_read, "[ProcessingLoop] Source reached end");
                    break;
                }
            };
            summary.batches_read += 1;

            let tx = &senders[shard_for(&key, self.workers)];
            tokio::select! {
                () = self.cancel_token.cancelled() => break,
                sent = tx.send((key, batch)) => {
                    if sent.is_err() {
                        warn!("[ProcessingLoop] Ingest worker gone");
                        break;
                    }
                    summary.batches_dispatched += 1;
                }
            }
        }

        drop(senders);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "[ProcessingLoop] Ingest worker ended abnormally");
            }
        }

        info!(
            read = summary.batches_read,
            dispatched = summary.batches_dispatched,
            "{}",
            self.coordinator.stats()
        );
        summary
    }

    fn spawn_workers(&self) -> (Vec<mpsc::Sender<(SensorKey, RawBatch)>>, Vec<JoinHandle<()>>) {
        (0..self.workers)
            .map(|id| {
                let (tx, mut rx) = mpsc::channel::<(SensorKey, RawBatch)>(self.channel_capacity);
                let coordinator = Arc::clone(&self.coordinator);
                let handle = tokio::spawn(async move {
                    let mut processed = 0u64;
                    while let Some((key, batch)) = rx.recv().await {
                        coordinator.on_raw_batch(&key, &batch);
                        processed += 1;
                    }
                    debug!(worker = id, processed, "Ingest worker stopped");
                });
                (tx, handle)
            })
            .unzip()
    }
}
