//! Shared domain types for the argus abuse-detection observer.
//!
//! This crate holds everything the storage layer and the daemon agree on:
//! the ingest/alert/block wire types, the detection mode with its subnet
//! folding, and the environment-driven configuration.

pub mod config;
pub mod mode;
pub mod models;

pub use config::{Config, ConfigError};
pub use mode::DetectionMode;
pub use models::{AlertPayload, BlockMessage, CheckResult, CheckStatus, LogEntry, PoolStatus, UserStats};
