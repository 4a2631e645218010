//! Redis-backed [`LocatorStore`].
//!
//! The client is a `ConnectionManager`: cheap to clone, safe to share, and
//! reconnecting. Scripts are loaded once at startup with `SCRIPT LOAD` and
//! invoked by digest afterwards.

use std::collections::HashMap;
use std::time::Duration;

use argus_core::{CheckResult, DetectionMode};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script, Value};
use tracing::{debug, info};

use crate::keys::{self, Keyspace, USER_SET_SCAN_PATTERN};
use crate::scripts;
use crate::{LocatorStore, StoreError};

pub struct RedisStore {
  manager: ConnectionManager,
  observe: Script,
  clear: Script,
}

impl RedisStore {
  /// Connect, verify the server responds, and preload both scripts.
  ///
  /// Any failure here is fatal to the caller: the service must not start
  /// against a store it cannot reach.
  pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
    let client = redis::Client::open(redis_url)?;
    let manager = ConnectionManager::new(client).await?;

    let store = Self {
      manager,
      observe: Script::new(scripts::OBSERVE_AND_CHECK),
      clear: Script::new(scripts::CLEAR_USER),
    };

    store.ping().await?;

    let mut conn = store.manager.clone();
    for (name, text) in [("observe_and_check", scripts::OBSERVE_AND_CHECK), ("clear_user", scripts::CLEAR_USER)] {
      let sha: String = redis::cmd("SCRIPT").arg("LOAD").arg(text).query_async(&mut conn).await?;
      debug!(script = name, %sha, "lua script loaded");
    }

    info!("connected to redis, scripts loaded");
    Ok(store)
  }
}

#[async_trait]
impl LocatorStore for RedisStore {
  async fn check_and_add(
    &self,
    mode: DetectionMode,
    user: &str,
    locator: &str,
    limit: u64,
    ttl: Duration,
    cooldown: Duration,
  ) -> Result<CheckResult, StoreError> {
    let ks = Keyspace::for_mode(mode);
    let mut conn = self.manager.clone();

    let reply: Value = self
      .observe
      .key(ks.set_key(user))
      .key(keys::cooldown_key(user))
      .arg(ks.ttl_key_prefix(user))
      .arg(locator)
      .arg(ttl.as_secs())
      .arg(limit)
      .arg(cooldown.as_secs())
      .invoke_async(&mut conn)
      .await?;

    parse_check_result(reply, user)
  }

  async fn clear_user(&self, mode: DetectionMode, user: &str) -> Result<u64, StoreError> {
    let ks = Keyspace::for_mode(mode);
    let mut conn = self.manager.clone();

    let deleted: i64 = self
      .clear
      .key(ks.set_key(user))
      .arg(ks.ttl_key_prefix(user))
      .invoke_async(&mut conn)
      .await?;

    Ok(deleted.max(0) as u64)
  }

  async fn list_active(&self, mode: DetectionMode, user: &str) -> Result<HashMap<String, i64>, StoreError> {
    let ks = Keyspace::for_mode(mode);
    let mut conn = self.manager.clone();

    let members: Vec<String> = conn.smembers(ks.set_key(user)).await?;
    if members.is_empty() {
      return Ok(HashMap::new());
    }

    let mut pipe = redis::pipe();
    for member in &members {
      pipe.ttl(ks.ttl_key(user, member));
    }
    let ttls: Vec<i64> = pipe.query_async(&mut conn).await?;

    // TTL replies of -1 (no expiry) and -2 (missing key) mean the entry is
    // not an active, expiring locator; skip it.
    Ok(
      members
        .into_iter()
        .zip(ttls)
        .filter(|(_, ttl)| *ttl > 0)
        .collect(),
    )
  }

  async fn list_users(&self) -> Result<Vec<String>, StoreError> {
    let mut conn = self.manager.clone();
    let mut users: Vec<String> = Vec::new();

    {
      let mut iter = conn.scan_match::<_, String>(USER_SET_SCAN_PATTERN).await?;
      while let Some(key) = iter.next_item().await {
        if let Some(user) = keys::user_from_set_key(&key) {
          users.push(user.to_string());
        }
      }
    }

    users.sort_unstable();
    users.dedup();
    Ok(users)
  }

  async fn has_cooldown(&self, user: &str) -> Result<bool, StoreError> {
    let mut conn = self.manager.clone();
    let exists: bool = conn.exists(keys::cooldown_key(user)).await?;
    Ok(exists)
  }

  async fn ping(&self) -> Result<(), StoreError> {
    let mut conn = self.manager.clone();
    let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(())
  }
}

// ============================================================================
// Reply parsing
// ============================================================================

/// Decode an observe-and-check script reply.
///
/// Shapes (see `scripts.rs`): `{0, count, is_new}`, `{1, {members...}}`,
/// `{2, count}`. Anything else is a bug in the script/parser pair and is
/// reported as [`StoreError::MalformedReply`].
fn parse_check_result(reply: Value, user: &str) -> Result<CheckResult, StoreError> {
  let malformed = |detail: &str| StoreError::MalformedReply {
    user: user.to_string(),
    detail: detail.to_string(),
  };

  let Value::Array(items) = reply else {
    return Err(malformed("reply is not an array"));
  };

  let status = match items.first() {
    Some(Value::Int(n)) => *n,
    _ => return Err(malformed("missing status code")),
  };

  match status {
    0 => {
      let count = int_at(&items, 1).ok_or_else(|| malformed("OK reply missing count"))?;
      let added = int_at(&items, 2).ok_or_else(|| malformed("OK reply missing is_new flag"))?;
      Ok(CheckResult::ok(count.max(0) as u64, added == 1))
    }
    1 => {
      let Some(Value::Array(members)) = items.get(1) else {
        return Err(malformed("block reply missing member list"));
      };
      let all_items = members
        .iter()
        .filter_map(value_as_string)
        .collect::<Vec<String>>();
      Ok(CheckResult::block(all_items))
    }
    2 => {
      let count = int_at(&items, 1).ok_or_else(|| malformed("cooldown reply missing count"))?;
      Ok(CheckResult::cooldown(count.max(0) as u64))
    }
    other => Err(malformed(&format!("unknown status code {other}"))),
  }
}

fn int_at(items: &[Value], idx: usize) -> Option<i64> {
  match items.get(idx) {
    Some(Value::Int(n)) => Some(*n),
    _ => None,
  }
}

fn value_as_string(value: &Value) -> Option<String> {
  match value {
    Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
    Value::SimpleString(s) => Some(s.clone()),
    _ => None,
  }
}
