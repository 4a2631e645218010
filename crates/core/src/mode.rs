//! Detection mode and locator computation.
//!
//! The service counts *locators* per user: raw IPv4 addresses in `ByIp` mode,
//! or /N networks in `BySubnet` mode. The mode is fixed at startup; the two
//! modes use disjoint keyspaces in the store and must not be mixed within one
//! deployment.

use std::net::Ipv4Addr;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMode {
  ByIp,
  BySubnet,
}

impl DetectionMode {
  pub fn from_config(cfg: &Config) -> Self {
    if cfg.detect_by_subnet {
      DetectionMode::BySubnet
    } else {
      DetectionMode::ByIp
    }
  }

  /// `violation_type` string carried in alert payloads.
  pub fn violation_type(&self) -> &'static str {
    match self {
      DetectionMode::ByIp => "ip_limit_exceeded",
      DetectionMode::BySubnet => "subnet_limit_exceeded",
    }
  }

  /// Human label used in monitor report headers.
  pub fn pool_label(&self) -> &'static str {
    match self {
      DetectionMode::ByIp => "IP POOLS",
      DetectionMode::BySubnet => "SUBNET POOLS",
    }
  }

  /// Per-mode locator TTL.
  pub fn locator_ttl(&self, cfg: &Config) -> std::time::Duration {
    match self {
      DetectionMode::ByIp => cfg.user_ip_ttl,
      DetectionMode::BySubnet => cfg.user_subnet_ttl,
    }
  }

  /// Per-mode base limit, before any debug-user override.
  pub fn base_limit(&self, cfg: &Config) -> u64 {
    match self {
      DetectionMode::ByIp => cfg.max_ips_per_user,
      DetectionMode::BySubnet => cfg.max_subnets_per_user,
    }
  }

  /// Compute the locator for a source address, or `None` when the entry must
  /// be dropped.
  ///
  /// In `ByIp` mode the address string is taken verbatim. In `BySubnet` mode
  /// the address is parsed as IPv4 and masked to `prefix`; anything that is
  /// not a valid IPv4 address is discarded.
  pub fn locator_for(&self, source_ip: &str, prefix: u8) -> Option<String> {
    match self {
      DetectionMode::ByIp => Some(source_ip.to_string()),
      DetectionMode::BySubnet => fold_subnet(source_ip, prefix),
    }
  }
}

/// Mask an IPv4 address down to its /`prefix` network, rendered in CIDR form.
pub fn fold_subnet(source_ip: &str, prefix: u8) -> Option<String> {
  let addr: Ipv4Addr = source_ip.trim().parse().ok()?;
  let prefix = prefix.min(32);
  let mask: u32 = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
  let network = Ipv4Addr::from(u32::from(addr) & mask);
  Some(format!("{network}/{prefix}"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn folds_to_slash_24() {
    assert_eq!(fold_subnet("10.0.1.5", 24).unwrap(), "10.0.1.0/24");
    assert_eq!(fold_subnet("10.0.1.9", 24).unwrap(), "10.0.1.0/24");
    assert_eq!(fold_subnet("10.0.2.1", 24).unwrap(), "10.0.2.0/24");
  }

  #[test]
  fn folds_other_prefixes() {
    assert_eq!(fold_subnet("192.168.37.200", 16).unwrap(), "192.168.0.0/16");
    assert_eq!(fold_subnet("1.2.3.4", 32).unwrap(), "1.2.3.4/32");
    assert_eq!(fold_subnet("1.2.3.4", 0).unwrap(), "0.0.0.0/0");
  }

  #[test]
  fn drops_invalid_and_non_ipv4() {
    assert!(fold_subnet("not-an-ip", 24).is_none());
    assert!(fold_subnet("", 24).is_none());
    assert!(fold_subnet("2001:db8::1", 24).is_none());
    assert!(fold_subnet("300.1.2.3", 24).is_none());
  }

  #[test]
  fn ip_mode_passes_through_verbatim() {
    let mode = DetectionMode::ByIp;
    // even junk passes in IP mode; admission does not validate raw IPs
    assert_eq!(mode.locator_for("1.2.3.4", 24).unwrap(), "1.2.3.4");
  }

  #[test]
  fn subnet_mode_discards_unparseable() {
    let mode = DetectionMode::BySubnet;
    assert!(mode.locator_for("bogus", 24).is_none());
    assert_eq!(mode.locator_for("10.9.8.7", 24).unwrap(), "10.9.8.0/24");
  }
}
