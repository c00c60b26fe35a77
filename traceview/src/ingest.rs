//! Ingestion pipeline between the receive loop and the store.
//!
//! Raw payloads enter a bounded queue through an [`IngestHandle`]. A pool of
//! worker tasks pops payloads, parses them and inserts the resulting records.
//! When the queue is full, [`IngestHandle::submit`] waits for room instead of
//! dropping anything, which pushes backpressure onto the receive loop.
//!
//! A payload that fails to parse, or whose record fails to insert, is logged
//! and counted; the worker then moves on to the next one.
//!
//! Closing works by dropping every handle: the workers drain what is still
//! queued and exit, and [`IngestPipeline::join`] returns the final counts.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::PipelineConfig;
use crate::error::{IngestError, Result};
use crate::parser::PayloadParser;
use crate::store::TraceStore;

/// Largest payload a single datagram can carry.
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// Live ingestion counters, shared between handles and workers.
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    stored: AtomicU64,
    rejected: AtomicU64,
    store_failed: AtomicU64,
}

impl IngestStats {
    /// Takes a point-in-time copy of the counters.
    pub fn snapshot(&self) -> IngestCounts {
        IngestCounts {
            received: self.received.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            store_failed: self.store_failed.load(Ordering::Relaxed),
        }
    }
}

/// Copy of the ingestion counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestCounts {
    /// Payloads accepted into the queue.
    pub received: u64,
    /// Records inserted into the store.
    pub stored: u64,
    /// Payloads the parser rejected.
    pub rejected: u64,
    /// Parsed records the store failed to insert.
    pub store_failed: u64,
}

/// Producer side of the queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct IngestHandle {
    tx: mpsc::Sender<String>,
    stats: Arc<IngestStats>,
}

impl IngestHandle {
    /// Queues a payload, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::QueueClosed`] once the consumer side is gone.
    pub async fn submit(&self, payload: String) -> Result<()> {
        self.tx
            .send(payload)
            .await
            .map_err(|_| IngestError::QueueClosed)?;
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Queues a payload without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::QueueFull`] if the queue is at capacity and
    /// [`IngestError::QueueClosed`] once the consumer side is gone.
    pub fn try_submit(&self, payload: String) -> Result<()> {
        self.tx.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => IngestError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => IngestError::QueueClosed,
        })?;
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Shared counters of this pipeline.
    pub fn stats(&self) -> Arc<IngestStats> {
        Arc::clone(&self.stats)
    }
}

/// Consumer side of the queue, not yet attached to workers.
#[derive(Debug)]
pub struct IngestQueue {
    rx: mpsc::Receiver<String>,
    stats: Arc<IngestStats>,
}

/// Creates a bounded queue with the given capacity (at least one).
pub fn channel(capacity: usize) -> (IngestHandle, IngestQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let stats = Arc::new(IngestStats::default());
    (
        IngestHandle {
            tx,
            stats: Arc::clone(&stats),
        },
        IngestQueue { rx, stats },
    )
}

/// Creates the queue and starts its workers in one step.
///
/// Must be called from within a Tokio runtime.
pub fn spawn(
    parser: Arc<PayloadParser>,
    store: Arc<dyn TraceStore>,
    config: PipelineConfig,
) -> (IngestHandle, IngestPipeline) {
    let (handle, queue) = channel(config.queue_capacity);
    (handle, queue.spawn_workers(parser, store, config.workers))
}

impl IngestQueue {
    /// Starts `workers` tasks (at least one) draining this queue.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_workers(
        self,
        parser: Arc<PayloadParser>,
        store: Arc<dyn TraceStore>,
        workers: usize,
    ) -> IngestPipeline {
        let rx = Arc::new(Mutex::new(self.rx));
        let tasks = (0..workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let parser = Arc::clone(&parser);
                let store = Arc::clone(&store);
                let stats = Arc::clone(&self.stats);
                tokio::spawn(async move {
                    run_worker(worker, rx, parser, store, stats).await;
                })
            })
            .collect();

        IngestPipeline {
            tasks,
            stats: self.stats,
        }
    }
}

/// Running worker pool.
#[derive(Debug)]
pub struct IngestPipeline {
    tasks: Vec<JoinHandle<()>>,
    stats: Arc<IngestStats>,
}

impl IngestPipeline {
    /// Shared counters of this pipeline.
    pub fn stats(&self) -> Arc<IngestStats> {
        Arc::clone(&self.stats)
    }

    /// Number of worker tasks.
    pub fn workers(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for every worker to finish and returns the final counts.
    ///
    /// Workers only finish after all [`IngestHandle`]s are dropped and the
    /// queue is drained.
    pub async fn join(self) -> IngestCounts {
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "ingestion worker terminated abnormally");
            }
        }
        self.stats.snapshot()
    }
}

async fn run_worker(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
    parser: Arc<PayloadParser>,
    store: Arc<dyn TraceStore>,
    stats: Arc<IngestStats>,
) {
    debug!(worker, "ingestion worker started");
    loop {
        let next = rx.lock().await.recv().await;
        let Some(payload) = next else {
            break;
        };
        process_payload(&parser, store.as_ref(), &stats, &payload);
    }
    debug!(worker, "ingestion worker stopped");
}

/// Parses one payload and inserts the record, updating `stats`.
///
/// Never fails: parse and insert errors are logged and counted.
pub fn process_payload(
    parser: &PayloadParser,
    store: &dyn TraceStore,
    stats: &IngestStats,
    payload: &str,
) {
    let record = match parser.parse(payload) {
        Ok(record) => record,
        Err(e) => {
            stats.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, bytes = payload.len(), "rejected payload");
            return;
        }
    };

    let id = record.id();
    match store.insert(record, Some(payload)) {
        Ok(()) => {
            stats.stored.fetch_add(1, Ordering::Relaxed);
            debug!(%id, "stored record");
        }
        Err(e) => {
            stats.store_failed.fetch_add(1, Ordering::Relaxed);
            warn!(%id, error = %e, "failed to store record");
        }
    }
}
