//! Queue semantics and shutdown-drain behavior for the worker pools.

mod common;

use std::sync::Arc;

use argus_core::{CheckResult, LogEntry};
use daemon::{EnqueueError, IngestPool, Processor, SideEffectPool};
use tokio_util::sync::CancellationToken;

use common::{test_config, RecordingAlerter, RecordingPublisher, ScriptedStore};

fn entry(user: &str, ip: &str) -> LogEntry {
  LogEntry {
    user_email: user.to_string(),
    source_ip: ip.to_string(),
  }
}

fn build_processor(store: Arc<ScriptedStore>, cancel: CancellationToken) -> (Arc<Processor>, Vec<tokio::task::JoinHandle<()>>) {
  let (side_effects, pool) = SideEffectPool::new(1, 16, cancel.clone());
  let side_effect_workers = pool.spawn();

  let processor = Arc::new(Processor::new(
    store as Arc<dyn store::LocatorStore>,
    Arc::new(RecordingPublisher::default()) as Arc<dyn daemon::BlockPublisher>,
    Arc::new(RecordingAlerter::default()) as Arc<dyn daemon::Notifier>,
    Arc::new(test_config()),
    side_effects,
    cancel,
  ));

  (processor, side_effect_workers)
}

#[tokio::test]
async fn enqueue_is_rejected_when_the_queue_is_full() {
  let cancel = CancellationToken::new();
  let store = Arc::new(ScriptedStore::default());
  let (processor, _side_effect_workers) = build_processor(store, cancel);

  // buffer of one, no workers spawned: the second offer must bounce
  let (handle, _pool) = IngestPool::new(1, 1, processor);

  assert_eq!(handle.enqueue(vec![entry("a@x.y", "1.1.1.1")]), Ok(()));
  assert_eq!(
    handle.enqueue(vec![entry("b@x.y", "2.2.2.2")]),
    Err(EnqueueError::QueueFull)
  );
}

#[tokio::test]
async fn enqueue_after_close_reports_stopping() {
  let cancel = CancellationToken::new();
  let store = Arc::new(ScriptedStore::default());
  let (processor, _side_effect_workers) = build_processor(store, cancel);

  let (handle, pool) = IngestPool::new(1, 4, processor);
  // dropping the unspawned pool drops the receiver, closing the channel
  drop(pool);

  assert_eq!(
    handle.enqueue(vec![entry("a@x.y", "1.1.1.1")]),
    Err(EnqueueError::Stopping)
  );
}

#[tokio::test]
async fn queued_batches_drain_before_workers_exit() {
  let cancel = CancellationToken::new();
  let store = Arc::new(ScriptedStore::with_replies(vec![
    Ok(CheckResult::ok(1, true)),
    Ok(CheckResult::ok(1, true)),
    Ok(CheckResult::ok(1, true)),
  ]));
  let (processor, side_effect_workers) = build_processor(Arc::clone(&store), cancel);

  let (handle, pool) = IngestPool::new(2, 8, Arc::clone(&processor));

  handle.enqueue(vec![entry("a@x.y", "1.1.1.1")]).unwrap();
  handle.enqueue(vec![entry("b@x.y", "2.2.2.2")]).unwrap();
  handle.enqueue(vec![entry("c@x.y", "3.3.3.3")]).unwrap();

  // close the queue, then start the workers: everything queued must still
  // be processed before they exit
  drop(handle);
  for worker in pool.spawn() {
    worker.await.unwrap();
  }

  assert_eq!(store.calls().len(), 3);

  drop(processor);
  for worker in side_effect_workers {
    worker.await.unwrap();
  }
}

#[tokio::test]
async fn cancellation_abandons_batches_during_drain() {
  let cancel = CancellationToken::new();
  let store = Arc::new(ScriptedStore::default());
  let (processor, _side_effect_workers) = build_processor(Arc::clone(&store), cancel.clone());

  let (handle, pool) = IngestPool::new(1, 8, processor);
  handle.enqueue(vec![entry("a@x.y", "1.1.1.1"), entry("a@x.y", "1.1.1.2")]).unwrap();

  // cancel before the workers start: batches are dequeued but abandoned
  // at the first per-entry check
  cancel.cancel();
  drop(handle);
  for worker in pool.spawn() {
    worker.await.unwrap();
  }

  assert!(store.calls().is_empty());
}

#[tokio::test]
async fn a_panicking_batch_does_not_stop_the_pool() {
  let cancel = CancellationToken::new();
  let store = Arc::new(ScriptedStore::with_replies(vec![Ok(CheckResult::ok(1, true))]));
  let (processor, _side_effect_workers) = build_processor(Arc::clone(&store), cancel);

  let (handle, pool) = IngestPool::new(1, 8, processor);

  // the scripted store panics for this user
  handle.enqueue(vec![entry("panic@example.com", "9.9.9.9")]).unwrap();
  handle.enqueue(vec![entry("ok@example.com", "1.1.1.1")]).unwrap();

  drop(handle);
  for worker in pool.spawn() {
    worker.await.unwrap();
  }

  // the worker survived the panic and processed the second batch
  let calls = store.calls();
  assert_eq!(calls.len(), 1);
  assert_eq!(calls[0].user, "ok@example.com");
}
