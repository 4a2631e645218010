//! HTTP ingress: batch submission and health.
//!
//! The ingestion endpoint is thin: parse, offer to the queue, answer. A full
//! queue is a distinct, observable condition (503 with a `queue full` body)
//! rather than a timeout.

use std::sync::Arc;

use argus_core::LogEntry;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use store::LocatorStore;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ingest::{EnqueueError, IngestHandle};

#[derive(Debug, Error)]
pub enum ServeError {
  #[error("failed to bind listener: {0}")]
  Bind(std::io::Error),
  #[error("server error: {0}")]
  Serve(std::io::Error),
}

#[derive(Clone)]
pub struct AppState {
  pub ingest: IngestHandle,
  pub store: Arc<dyn LocatorStore>,
}

pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/log-entry", post(submit_entries))
    .route("/health", get(health))
    .with_state(state)
}

/// Bind and serve until the token is cancelled, then drain in-flight
/// connections.
pub async fn serve(port: u16, state: AppState, cancel: CancellationToken) -> Result<(), ServeError> {
  let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
    .await
    .map_err(ServeError::Bind)?;
  info!(port, "http listener bound");

  axum::serve(listener, router(state))
    .with_graceful_shutdown(async move { cancel.cancelled().await })
    .await
    .map_err(ServeError::Serve)?;

  info!("http server stopped");
  Ok(())
}

async fn submit_entries(State(state): State<AppState>, Json(entries): Json<Vec<LogEntry>>) -> (StatusCode, Json<Value>) {
  let count = entries.len();
  let (status, body) = enqueue_response(state.ingest.enqueue(entries), count);
  (status, Json(body))
}

/// Map an enqueue outcome onto the HTTP contract.
fn enqueue_response(result: Result<(), EnqueueError>, count: usize) -> (StatusCode, Value) {
  match result {
    Ok(()) => (StatusCode::OK, json!({ "status": "queued", "entries": count })),
    Err(EnqueueError::QueueFull) => {
      warn!(entries = count, "ingestion queue full, rejecting batch");
      (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": "queue full" }))
    }
    Err(EnqueueError::Stopping) => (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": "shutting down" })),
  }
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
  match state.store.ping().await {
    Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
    Err(err) => (
      StatusCode::SERVICE_UNAVAILABLE,
      Json(json!({ "status": "degraded", "error": err.to_string() })),
    ),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepted_batches_report_entry_count() {
    let (status, body) = enqueue_response(Ok(()), 3);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["entries"], 3);
  }

  #[test]
  fn full_queue_is_a_distinct_503() {
    let (status, body) = enqueue_response(Err(EnqueueError::QueueFull), 1);
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "queue full");
  }

  #[test]
  fn shutdown_is_reported_benignly() {
    let (status, body) = enqueue_response(Err(EnqueueError::Stopping), 1);
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "shutting down");
  }
}
