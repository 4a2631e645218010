//! Wire and domain types shared across the pipeline.

use serde::{Deserialize, Serialize};

/// A single access event as submitted by the ingestion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
  pub user_email: String,
  pub source_ip: String,
}

/// Outcome class of an observe-and-check call against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
  /// Under or at the limit; the locator was recorded.
  Ok,
  /// The limit was crossed by this observation and no cooldown was armed:
  /// a block must be dispatched. The cooldown is now set.
  LimitBlock,
  /// Over the limit but the user is already in cooldown; stay silent.
  LimitCooldown,
}

/// Result of an atomic observe-and-check state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
  pub status: CheckStatus,
  /// Count of active locators after the call.
  pub current_count: u64,
  /// Whether this observation introduced a previously-unseen locator.
  /// Only meaningful for [`CheckStatus::Ok`].
  pub is_new: bool,
  /// The full current locator set. Only populated for
  /// [`CheckStatus::LimitBlock`].
  pub all_items: Vec<String>,
}

impl CheckResult {
  pub fn ok(current_count: u64, is_new: bool) -> Self {
    Self {
      status: CheckStatus::Ok,
      current_count,
      is_new,
      all_items: Vec::new(),
    }
  }

  pub fn block(all_items: Vec<String>) -> Self {
    Self {
      status: CheckStatus::LimitBlock,
      current_count: all_items.len() as u64,
      is_new: false,
      all_items,
    }
  }

  pub fn cooldown(current_count: u64) -> Self {
    Self {
      status: CheckStatus::LimitCooldown,
      current_count,
      is_new: false,
      all_items: Vec::new(),
    }
  }
}

/// Payload POSTed to the operator webhook on a limit violation.
///
/// `all_user_ips` and `detected_ips_count` carry raw IPs or CIDR strings
/// depending on the detection mode. Exclusion lists are not applied here;
/// the alert always carries the full locator set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
  pub user_identifier: String,
  pub detected_ips_count: u64,
  pub limit: u64,
  pub all_user_ips: Vec<String>,
  pub block_duration: String,
  pub violation_type: String,
}

/// Message published to the enforcement bus.
///
/// `duration` is an opaque string (e.g. `"5m"`) forwarded verbatim; the
/// enforcement worker hands it to its firewall backend unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockMessage {
  pub ips: Vec<String>,
  pub duration: String,
}

/// Health classification of a user's locator pool, for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
  Normal,
  NearLimit,
  OverLimit,
}

impl PoolStatus {
  /// Classify a pool. `NEAR_LIMIT` from 80% of the limit, `OVER_LIMIT`
  /// strictly above it - sitting exactly at the limit is not a violation.
  pub fn classify(count: u64, limit: u64) -> Self {
    if count > limit {
      PoolStatus::OverLimit
    } else if (count as f64) >= (limit as f64) * 0.8 {
      PoolStatus::NearLimit
    } else {
      PoolStatus::Normal
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      PoolStatus::Normal => "NORMAL",
      PoolStatus::NearLimit => "NEAR_LIMIT",
      PoolStatus::OverLimit => "OVER_LIMIT",
    }
  }
}

/// Per-user aggregate built by the monitor reporter.
#[derive(Debug, Clone)]
pub struct UserStats {
  pub email: String,
  pub count: u64,
  pub limit: u64,
  /// Sorted locator strings.
  pub items: Vec<String>,
  /// Sorted locator strings annotated with remaining TTL, e.g. `1.2.3.4(3.9h)`.
  pub items_with_ttl: Vec<String>,
  pub min_ttl_hours: f64,
  pub max_ttl_hours: f64,
  pub status: PoolStatus,
  pub has_cooldown: bool,
  pub is_excluded: bool,
  pub is_debug: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn alert_payload_field_names() {
    let payload = AlertPayload {
      user_identifier: "u@example.com".into(),
      detected_ips_count: 4,
      limit: 3,
      all_user_ips: vec!["1.1.1.1".into(), "1.1.1.2".into()],
      block_duration: "5m".into(),
      violation_type: "ip_limit_exceeded".into(),
    };

    let json: serde_json::Value = serde_json::to_value(&payload).unwrap();
    assert_eq!(json["user_identifier"], "u@example.com");
    assert_eq!(json["detected_ips_count"], 4);
    assert_eq!(json["limit"], 3);
    assert_eq!(json["all_user_ips"][0], "1.1.1.1");
    assert_eq!(json["block_duration"], "5m");
    assert_eq!(json["violation_type"], "ip_limit_exceeded");
  }

  #[test]
  fn block_message_roundtrip() {
    let msg = BlockMessage {
      ips: vec!["10.0.1.0/24".into()],
      duration: "5m".into(),
    };
    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"ips\""));
    assert!(json.contains("\"duration\":\"5m\""));

    let back: BlockMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(back.ips, msg.ips);
  }

  #[test]
  fn log_entry_wire_names() {
    let entry: LogEntry = serde_json::from_str(r#"{"user_email":"a@b.c","source_ip":"1.2.3.4"}"#).unwrap();
    assert_eq!(entry.user_email, "a@b.c");
    assert_eq!(entry.source_ip, "1.2.3.4");
  }

  #[test]
  fn pool_status_thresholds() {
    // 3-limit pool: 0-1 normal, 2 is below 2.4 so still normal, 3 near, 4 over
    assert_eq!(PoolStatus::classify(1, 3), PoolStatus::Normal);
    assert_eq!(PoolStatus::classify(2, 3), PoolStatus::Normal);
    assert_eq!(PoolStatus::classify(3, 3), PoolStatus::NearLimit);
    assert_eq!(PoolStatus::classify(4, 3), PoolStatus::OverLimit);

    // 80% boundary is inclusive
    assert_eq!(PoolStatus::classify(4, 5), PoolStatus::NearLimit);
    // exactly at the limit is not a violation
    assert_eq!(PoolStatus::classify(5, 5), PoolStatus::NearLimit);
  }
}
