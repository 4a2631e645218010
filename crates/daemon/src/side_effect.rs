//! Side-effect executor: a bounded pool draining a bounded queue of opaque
//! tasks (alert deliveries, block publications, delayed clears).
//!
//! Slow external systems live behind this queue so they can never couple
//! ingestion latency to webhook or bus latency. The queue sheds load: a full
//! queue drops the task with a warning, and correctness survives because the
//! cooldown marker suppresses storms and the block is reissued on the next
//! triggering event.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// An opaque unit of deferred work.
pub type SideEffectTask = BoxFuture<'static, ()>;

/// Producer half: non-blocking enqueue with drop-on-full semantics.
#[derive(Clone)]
pub struct SideEffectHandle {
  tx: mpsc::Sender<(&'static str, SideEffectTask)>,
}

impl SideEffectHandle {
  /// Offer a task to the queue. Never blocks: a full queue drops the task,
  /// a closed queue means the service is stopping.
  pub fn enqueue(&self, label: &'static str, task: SideEffectTask) {
    match self.tx.try_send((label, task)) {
      Ok(()) => {}
      Err(TrySendError::Full(_)) => {
        warn!(task = label, "side-effect queue full, task dropped");
      }
      Err(TrySendError::Closed(_)) => {
        info!(task = label, "side-effect queue closed, service stopping");
      }
    }
  }
}

/// The worker pool. Workers drain the queue until it is closed and empty;
/// once shutdown has been signalled, remaining tasks are skipped rather than
/// executed.
pub struct SideEffectPool {
  rx: Arc<Mutex<mpsc::Receiver<(&'static str, SideEffectTask)>>>,
  workers: usize,
  cancel: CancellationToken,
}

impl SideEffectPool {
  pub fn new(workers: usize, buffer: usize, cancel: CancellationToken) -> (SideEffectHandle, Self) {
    let (tx, rx) = mpsc::channel(buffer);
    (
      SideEffectHandle { tx },
      Self {
        rx: Arc::new(Mutex::new(rx)),
        workers,
        cancel,
      },
    )
  }

  /// Spawn the workers. Each worker exits when the queue is closed and
  /// drained.
  pub fn spawn(self) -> Vec<JoinHandle<()>> {
    info!(workers = self.workers, "starting side-effect worker pool");

    (0..self.workers)
      .map(|id| {
        let rx = Arc::clone(&self.rx);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
          worker_loop(id + 1, rx, cancel).await;
        })
      })
      .collect()
  }
}

async fn worker_loop(
  id: usize,
  rx: Arc<Mutex<mpsc::Receiver<(&'static str, SideEffectTask)>>>,
  cancel: CancellationToken,
) {
  debug!(worker = id, "side-effect worker started");

  loop {
    let next = {
      let mut rx = rx.lock().await;
      rx.recv().await
    };

    let Some((label, task)) = next else {
      break;
    };

    if cancel.is_cancelled() {
      debug!(worker = id, task = label, "skipping side-effect task, shutting down");
      continue;
    }

    // a panicking task must not take the worker down with it
    if AssertUnwindSafe(task).catch_unwind().await.is_err() {
      error!(worker = id, task = label, "side-effect task panicked");
    }
  }

  debug!(worker = id, "side-effect worker stopped");
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[tokio::test]
  async fn runs_enqueued_tasks() {
    let cancel = CancellationToken::new();
    let (handle, pool) = SideEffectPool::new(2, 8, cancel);
    let workers = pool.spawn();

    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..5 {
      let counter = Arc::clone(&counter);
      handle.enqueue("test", Box::pin(async move {
        counter.fetch_add(1, Ordering::SeqCst);
      }));
    }

    drop(handle);
    for worker in workers {
      worker.await.unwrap();
    }
    assert_eq!(counter.load(Ordering::SeqCst), 5);
  }

  #[tokio::test]
  async fn full_queue_drops_without_blocking() {
    let cancel = CancellationToken::new();
    // no workers spawned: nothing drains the queue
    let (handle, _pool) = SideEffectPool::new(1, 1, cancel);

    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..10 {
      let counter = Arc::clone(&counter);
      // must return immediately even though the queue is full
      handle.enqueue("test", Box::pin(async move {
        counter.fetch_add(1, Ordering::SeqCst);
      }));
    }

    assert_eq!(counter.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn cancelled_pool_skips_remaining_tasks() {
    let cancel = CancellationToken::new();
    let (handle, pool) = SideEffectPool::new(1, 8, cancel.clone());

    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
      let counter = Arc::clone(&counter);
      handle.enqueue("test", Box::pin(async move {
        counter.fetch_add(1, Ordering::SeqCst);
      }));
    }

    // cancel before any worker exists, then start draining
    cancel.cancel();
    let workers = pool.spawn();
    drop(handle);
    for worker in workers {
      worker.await.unwrap();
    }

    assert_eq!(counter.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn panicking_task_does_not_kill_the_worker() {
    let cancel = CancellationToken::new();
    let (handle, pool) = SideEffectPool::new(1, 8, cancel);
    let workers = pool.spawn();

    handle.enqueue("boom", Box::pin(async {
      panic!("task exploded");
    }));

    let counter = Arc::new(AtomicUsize::new(0));
    {
      let counter = Arc::clone(&counter);
      handle.enqueue("after", Box::pin(async move {
        counter.fetch_add(1, Ordering::SeqCst);
      }));
    }

    drop(handle);
    for worker in workers {
      worker.await.unwrap();
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }
}
