//! Canonical key layout.
//!
//! - `user_ips:<user>` / `user_subnets:<user>` - set of locator strings
//! - `ip_ttl:<user>:<ip>` / `subnet_ttl:<user>:<cidr>` - TTL sentinels
//! - `alert_sent:<user>` - cooldown marker, shared between modes

use argus_core::DetectionMode;

/// Pattern matching both set keyspaces. This intentionally conflates
/// `user_ips:` and `user_subnets:`; deployments run a single mode.
pub const USER_SET_SCAN_PATTERN: &str = "user_*s:*";

/// Key prefixes for one detection mode's keyspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keyspace {
  set_prefix: &'static str,
  ttl_prefix: &'static str,
}

impl Keyspace {
  pub fn for_mode(mode: DetectionMode) -> Self {
    match mode {
      DetectionMode::ByIp => Self {
        set_prefix: "user_ips",
        ttl_prefix: "ip_ttl",
      },
      DetectionMode::BySubnet => Self {
        set_prefix: "user_subnets",
        ttl_prefix: "subnet_ttl",
      },
    }
  }

  /// The user's locator set key.
  pub fn set_key(&self, user: &str) -> String {
    format!("{}:{}", self.set_prefix, user)
  }

  /// Prefix for per-locator TTL keys; the scripts append `:<locator>`.
  pub fn ttl_key_prefix(&self, user: &str) -> String {
    format!("{}:{}", self.ttl_prefix, user)
  }

  /// A single locator's TTL key.
  pub fn ttl_key(&self, user: &str, locator: &str) -> String {
    format!("{}:{}:{}", self.ttl_prefix, user, locator)
  }
}

pub fn cooldown_key(user: &str) -> String {
  format!("alert_sent:{user}")
}

/// Extract the user id from a set key produced by either keyspace.
pub fn user_from_set_key(key: &str) -> Option<&str> {
  key.split_once(':').map(|(_, user)| user)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ip_keyspace_layout() {
    let ks = Keyspace::for_mode(DetectionMode::ByIp);
    assert_eq!(ks.set_key("a@b.c"), "user_ips:a@b.c");
    assert_eq!(ks.ttl_key_prefix("a@b.c"), "ip_ttl:a@b.c");
    assert_eq!(ks.ttl_key("a@b.c", "1.2.3.4"), "ip_ttl:a@b.c:1.2.3.4");
  }

  #[test]
  fn subnet_keyspace_layout() {
    let ks = Keyspace::for_mode(DetectionMode::BySubnet);
    assert_eq!(ks.set_key("a@b.c"), "user_subnets:a@b.c");
    assert_eq!(ks.ttl_key("a@b.c", "10.0.1.0/24"), "subnet_ttl:a@b.c:10.0.1.0/24");
  }

  #[test]
  fn cooldown_is_mode_agnostic() {
    assert_eq!(cooldown_key("a@b.c"), "alert_sent:a@b.c");
  }

  #[test]
  fn user_extraction_keeps_colons_in_user() {
    assert_eq!(user_from_set_key("user_ips:a@b.c"), Some("a@b.c"));
    // opaque ids may themselves contain colons
    assert_eq!(user_from_set_key("user_subnets:tenant:42"), Some("tenant:42"));
    assert_eq!(user_from_set_key("no-colon"), None);
  }
}
