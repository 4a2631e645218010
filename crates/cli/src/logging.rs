//! Logging initialization.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Console-only logging, filtered by `RUST_LOG` (default `info`).
pub fn init_console_logging() {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
    .init();
}

/// Console plus daily-rolling file logging when `ARGUS_LOG_DIR` is set.
/// Returns the guard that must stay alive for the duration of the program.
pub fn init_service_logging() -> Option<WorkerGuard> {
  let Ok(log_dir) = std::env::var("ARGUS_LOG_DIR") else {
    init_console_logging();
    return None;
  };

  let log_dir = PathBuf::from(log_dir);
  if std::fs::create_dir_all(&log_dir).is_err() {
    init_console_logging();
    return None;
  }

  let file_appender = tracing_appender::rolling::daily(&log_dir, "argus.log");
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  let env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

  let console_layer = tracing_subscriber::fmt::layer().with_target(true).with_ansi(true);

  let file_layer = tracing_subscriber::fmt::layer()
    .with_target(true)
    .with_ansi(false)
    .with_writer(file_writer);

  tracing_subscriber::registry()
    .with(env_filter)
    .with(console_layer)
    .with(file_layer)
    .init();

  Some(guard)
}
