//! Locator store: TTL-scoped per-user locator sets with atomic
//! observe-check-alert transitions.
//!
//! All mutating operations run as server-side Lua scripts so that the
//! critical section lives in the store, not the service - multiple service
//! replicas can share one store and still emit exactly one block per
//! violation window.

mod keys;
mod redis_store;
mod scripts;

use std::collections::HashMap;
use std::time::Duration;

use argus_core::{CheckResult, DetectionMode};
use async_trait::async_trait;
use thiserror::Error;

pub use keys::Keyspace;
pub use redis_store::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("redis error: {0}")]
  Redis(#[from] redis::RedisError),

  /// A script reply that does not match the documented shape. This is a
  /// bug-class error: the scripts and the parser ship together.
  #[error("malformed script reply for {user}: {detail}")]
  MalformedReply { user: String, detail: String },
}

/// Persistent state operations needed by the detection pipeline.
///
/// `mode` selects the keyspace (`user_ips:`/`ip_ttl:` vs
/// `user_subnets:`/`subnet_ttl:`); the cooldown marker keyspace is shared
/// between modes.
#[async_trait]
pub trait LocatorStore: Send + Sync {
  /// Atomic observe-and-check transition, the §4.1.1 contract:
  /// record the locator (unless suppressed by an at-limit cooldown) and
  /// report whether this observation crossed the limit.
  async fn check_and_add(
    &self,
    mode: DetectionMode,
    user: &str,
    locator: &str,
    limit: u64,
    ttl: Duration,
    cooldown: Duration,
  ) -> Result<CheckResult, StoreError>;

  /// Atomically delete the user's locator set and every per-locator TTL
  /// entry. Returns the number of keys removed.
  async fn clear_user(&self, mode: DetectionMode, user: &str) -> Result<u64, StoreError>;

  /// Best-effort read of the user's active locators with remaining TTLs in
  /// seconds. Expired or missing TTL entries are omitted.
  async fn list_active(&self, mode: DetectionMode, user: &str) -> Result<HashMap<String, i64>, StoreError>;

  /// Enumerate all users with an existing locator set, in either keyspace.
  async fn list_users(&self) -> Result<Vec<String>, StoreError>;

  /// Whether the user's alert cooldown marker is currently set.
  async fn has_cooldown(&self, user: &str) -> Result<bool, StoreError>;

  /// Connectivity check, used at startup and by the health endpoint.
  async fn ping(&self) -> Result<(), StoreError>;
}
