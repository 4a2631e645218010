//! The argus daemon: ingestion fan-out, detection processing, side-effect
//! execution, monitoring, and the HTTP ingress.
//!
//! # Architecture
//!
//! ```text
//! HTTP /log-entry ──► ingest queue ──► ingestion workers ──► Processor
//!                                                               │
//!                                      locator store ◄──────────┤ observe-and-check
//!                                                               │
//!                                side-effect queue ◄────────────┘ on violation
//!                                        │
//!                          side-effect workers ──► publisher / alerter / delayed clear
//! ```
//!
//! Control flow is one-way: nothing downstream ever calls back into the
//! ingest queue. Both queues are bounded and shed load instead of blocking:
//! a full ingest queue is surfaced to the HTTP caller as 503, a full
//! side-effect queue drops the task with a warning.

pub mod alerter;
pub mod ingest;
pub mod lifecycle;
pub mod monitor;
pub mod processor;
pub mod publisher;
pub mod server;
pub mod side_effect;

pub use alerter::{AlertError, Notifier, WebhookAlerter};
pub use ingest::{EnqueueError, IngestHandle, IngestPool};
pub use lifecycle::{Daemon, LifecycleError};
pub use monitor::Monitor;
pub use processor::Processor;
pub use publisher::{AmqpPublisher, BlockPublisher, PublishError};
pub use server::{serve, AppState};
pub use side_effect::{SideEffectHandle, SideEffectPool};
