//! Daemon supervisor: wiring, signal handling, and ordered shutdown.
//!
//! # Lifecycle
//!
//! 1. Connect the store (ping + script load) - fatal on failure
//! 2. Connect the publisher and declare the exchange - fatal on failure
//! 3. Spawn the side-effect pool, the ingestion pool, and the monitor
//! 4. Serve HTTP until a shutdown signal cancels the master token
//! 5. Drain in order: server → ingestion queue → ingestion workers →
//!    side-effect queue → side-effect workers → monitor

use std::sync::Arc;

use argus_core::Config;
use store::{LocatorStore, RedisStore, StoreError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::alerter::{Notifier, WebhookAlerter};
use crate::ingest::IngestPool;
use crate::monitor::Monitor;
use crate::processor::Processor;
use crate::publisher::{AmqpPublisher, BlockPublisher, PublishError};
use crate::server::{self, AppState, ServeError};
use crate::side_effect::SideEffectPool;

#[derive(Debug, Error)]
pub enum LifecycleError {
  #[error("store startup failed: {0}")]
  Store(#[from] StoreError),
  #[error("publisher startup failed: {0}")]
  Publisher(#[from] PublishError),
  #[error(transparent)]
  Server(#[from] ServeError),
}

pub struct Daemon {
  config: Arc<Config>,
}

impl Daemon {
  pub fn new(config: Config) -> Self {
    Self {
      config: Arc::new(config),
    }
  }

  /// Run until a shutdown signal, then drain.
  pub async fn run(self) -> Result<(), LifecycleError> {
    let config = self.config;
    config.log_summary();

    let cancel = CancellationToken::new();

    let store: Arc<dyn LocatorStore> = Arc::new(RedisStore::connect(&config.redis_url).await?);
    let publisher: Arc<dyn BlockPublisher> =
      Arc::new(AmqpPublisher::connect(&config.rabbitmq_url, &config.blocking_exchange_name).await?);
    let alerter: Arc<dyn Notifier> = Arc::new(WebhookAlerter::new(&config.alert_webhook_url));

    let (side_effects, side_effect_pool) = SideEffectPool::new(
      config.side_effect_worker_pool_size,
      config.side_effect_channel_buffer_size,
      cancel.clone(),
    );
    let side_effect_workers = side_effect_pool.spawn();

    let processor = Arc::new(Processor::new(
      Arc::clone(&store),
      publisher,
      alerter,
      Arc::clone(&config),
      side_effects.clone(),
      cancel.clone(),
    ));

    let (ingest, ingest_pool) = IngestPool::new(
      config.worker_pool_size,
      config.log_channel_buffer_size,
      Arc::clone(&processor),
    );
    let ingest_workers = ingest_pool.spawn();

    let monitor = Monitor::new(Arc::clone(&store), Arc::clone(&config));
    let monitor_task = tokio::spawn(monitor.run(cancel.child_token()));

    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
      wait_for_shutdown_signal().await;
      info!("shutdown signal received");
      cancel_on_signal.cancel();
    });

    // The server owns the only ingest handle; when it stops, the ingestion
    // queue closes behind it.
    let state = AppState {
      ingest,
      store: Arc::clone(&store),
    };
    let served = server::serve(config.port, state, cancel.child_token()).await;

    info!("shutting down");
    cancel.cancel();

    for worker in ingest_workers {
      let _ = worker.await;
    }
    info!("ingestion workers stopped");

    // the ingestion workers held the last processor references; dropping
    // ours closes the side-effect queue
    drop(processor);
    drop(side_effects);

    for worker in side_effect_workers {
      let _ = worker.await;
    }
    info!("side-effect workers stopped");

    let _ = monitor_task.await;

    if let Err(err) = &served {
      warn!("http server exited with error: {err}");
    }
    served?;

    info!("daemon shutdown complete");
    Ok(())
  }
}

/// Resolve on ctrl-c or, on unix, SIGTERM.
async fn wait_for_shutdown_signal() {
  let ctrl_c = async {
    if let Err(err) = tokio::signal::ctrl_c().await {
      warn!("failed to listen for ctrl-c: {err}");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut signal) => {
        signal.recv().await;
      }
      Err(err) => {
        warn!("failed to listen for SIGTERM: {err}");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {}
    _ = terminate => {}
  }
}
