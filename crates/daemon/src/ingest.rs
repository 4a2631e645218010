//! Ingestion fan-out: a bounded batch queue drained by a fixed worker pool.
//!
//! `enqueue` never blocks - admission control belongs to the HTTP boundary,
//! which turns [`EnqueueError::QueueFull`] into a 503. During shutdown the
//! queue closes; workers finish the batches already queued (with per-entry
//! cancellation checks inside the processor) and exit.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use argus_core::LogEntry;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::processor::Processor;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
  /// The batch queue is at capacity; the caller should reject the payload.
  #[error("ingestion queue is full")]
  QueueFull,
  /// The service is shutting down; not a failure worth retrying.
  #[error("service is stopping")]
  Stopping,
}

/// Producer half of the ingestion queue, handed to the HTTP layer.
#[derive(Clone)]
pub struct IngestHandle {
  tx: mpsc::Sender<Vec<LogEntry>>,
}

impl IngestHandle {
  /// Non-blocking offer of a batch.
  pub fn enqueue(&self, entries: Vec<LogEntry>) -> Result<(), EnqueueError> {
    match self.tx.try_send(entries) {
      Ok(()) => Ok(()),
      Err(TrySendError::Full(_)) => Err(EnqueueError::QueueFull),
      Err(TrySendError::Closed(_)) => Err(EnqueueError::Stopping),
    }
  }
}

/// The ingestion worker pool.
pub struct IngestPool {
  rx: Arc<Mutex<mpsc::Receiver<Vec<LogEntry>>>>,
  workers: usize,
  processor: Arc<Processor>,
}

impl IngestPool {
  pub fn new(workers: usize, buffer: usize, processor: Arc<Processor>) -> (IngestHandle, Self) {
    let (tx, rx) = mpsc::channel(buffer);
    (
      IngestHandle { tx },
      Self {
        rx: Arc::new(Mutex::new(rx)),
        workers,
        processor,
      },
    )
  }

  /// Spawn the workers. A worker exits when every producer handle has been
  /// dropped and the queue is drained.
  pub fn spawn(self) -> Vec<JoinHandle<()>> {
    info!(workers = self.workers, "starting ingestion worker pool");

    (0..self.workers)
      .map(|id| {
        let rx = Arc::clone(&self.rx);
        let processor = Arc::clone(&self.processor);
        tokio::spawn(async move {
          worker_loop(id + 1, rx, processor).await;
        })
      })
      .collect()
  }
}

async fn worker_loop(id: usize, rx: Arc<Mutex<mpsc::Receiver<Vec<LogEntry>>>>, processor: Arc<Processor>) {
  debug!(worker = id, "ingestion worker started");

  loop {
    let batch = {
      let mut rx = rx.lock().await;
      rx.recv().await
    };

    let Some(entries) = batch else {
      break;
    };

    // a panic while processing one batch must not shrink the pool
    let fut = processor.process_batch(entries);
    if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
      error!(worker = id, "batch processing panicked");
    }
  }

  debug!(worker = id, "ingestion worker stopped");
}
