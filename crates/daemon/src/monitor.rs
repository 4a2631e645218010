//! Periodic monitoring reporter.
//!
//! Read-only: enumerates users, reads their active locators, and prints a
//! human-readable aggregate to stdout. No atomicity across users is needed;
//! the report is an operator snapshot, not an accounting record.

use std::collections::HashMap;
use std::sync::Arc;

use argus_core::{Config, DetectionMode, PoolStatus, UserStats};
use store::LocatorStore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct Monitor {
  store: Arc<dyn LocatorStore>,
  config: Arc<Config>,
  mode: DetectionMode,
}

impl Monitor {
  pub fn new(store: Arc<dyn LocatorStore>, config: Arc<Config>) -> Self {
    let mode = DetectionMode::from_config(&config);
    Self { store, config, mode }
  }

  /// Run until cancelled, reporting every `monitoring_interval`.
  pub async fn run(self, cancel: CancellationToken) {
    info!(interval = ?self.config.monitoring_interval, "pool monitor started");

    let mut timer = tokio::time::interval(self.config.monitoring_interval);
    // interval fires immediately; the first report should wait a full period
    timer.tick().await;

    loop {
      tokio::select! {
        _ = timer.tick() => self.report().await,
        _ = cancel.cancelled() => {
          info!("pool monitor stopped");
          return;
        }
      }
    }
  }

  async fn report(&self) {
    let users = match self.store.list_users().await {
      Ok(users) => users,
      Err(err) => {
        error!("monitoring failed to enumerate users: {err}");
        return;
      }
    };

    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let label = self.mode.pool_label();

    if users.is_empty() {
      println!("[{now}] === {label} MONITORING === no active users");
      return;
    }

    let mut stats: Vec<UserStats> = Vec::with_capacity(users.len());
    for user in &users {
      match self.build_stats(user).await {
        Ok(Some(s)) => stats.push(s),
        Ok(None) => {}
        Err(err) => warn!(user = %user, "monitoring failed to build stats: {err}"),
      }
    }
    stats.sort_by(|a, b| b.count.cmp(&a.count));

    println!("\n[{now}] === {label} MONITORING START ===");
    print_summary(&stats, !self.config.debug_email.is_empty());
    print_top_users(&stats);
    print_over_limit(&stats);
    let end = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    println!("[{end}] === {label} MONITORING END ===\n");
  }

  async fn build_stats(&self, user: &str) -> Result<Option<UserStats>, store::StoreError> {
    let active = self.store.list_active(self.mode, user).await?;
    if active.is_empty() {
      return Ok(None);
    }

    // best-effort; a failed cooldown read only loses a marker in the report
    let has_cooldown = self.store.has_cooldown(user).await.unwrap_or(false);

    Ok(Some(assemble_stats(
      user,
      &active,
      self.config.limit_for(user, self.mode),
      has_cooldown,
      self.config.excluded_users.contains(user),
      self.config.is_debug_user(user),
    )))
  }
}

/// Fold a user's active-locator map into the report row.
fn assemble_stats(
  user: &str,
  active: &HashMap<String, i64>,
  limit: u64,
  has_cooldown: bool,
  is_excluded: bool,
  is_debug: bool,
) -> UserStats {
  let count = active.len() as u64;

  let mut items: Vec<String> = active.keys().cloned().collect();
  items.sort_unstable();

  let mut items_with_ttl: Vec<String> = active
    .iter()
    .map(|(item, ttl)| format!("{item}({:.1}h)", *ttl as f64 / 3600.0))
    .collect();
  items_with_ttl.sort_unstable();

  let mut ttls: Vec<i64> = active.values().copied().collect();
  ttls.sort_unstable();
  let min_ttl_hours = round_tenth(*ttls.first().unwrap_or(&0) as f64 / 3600.0);
  let max_ttl_hours = round_tenth(*ttls.last().unwrap_or(&0) as f64 / 3600.0);

  UserStats {
    email: user.to_string(),
    count,
    limit,
    items,
    items_with_ttl,
    min_ttl_hours,
    max_ttl_hours,
    status: PoolStatus::classify(count, limit),
    has_cooldown,
    is_excluded,
    is_debug,
  }
}

fn round_tenth(hours: f64) -> f64 {
  (hours * 10.0).round() / 10.0
}

fn markers(stats: &UserStats) -> String {
  let mut out = String::new();
  if stats.is_excluded {
    out.push_str(" [EXCLUDED]");
  }
  if stats.has_cooldown {
    out.push_str(" [ALERT_COOLDOWN]");
  }
  if stats.is_debug {
    out.push_str(" [DEBUG]");
  }
  out
}

fn print_summary(stats: &[UserStats], debug_configured: bool) {
  let near = stats.iter().filter(|s| s.status == PoolStatus::NearLimit).count();
  let over = stats.iter().filter(|s| s.status == PoolStatus::OverLimit).count();
  let excluded = stats.iter().filter(|s| s.is_excluded).count();

  println!("summary:");
  println!("  active users: {}", stats.len());
  println!("  near limit:   {near}");
  println!("  over limit:   {over}");
  println!("  excluded:     {excluded}");
  if debug_configured {
    let debug = stats.iter().filter(|s| s.is_debug).count();
    println!("  debug users:  {debug}");
  }
}

fn print_top_users(stats: &[UserStats]) {
  println!("top users by locator count:");
  for (rank, user) in stats.iter().take(10).enumerate() {
    println!(
      "  {:2}. [{}] {}{}",
      rank + 1,
      user.status.as_str(),
      user.email,
      markers(user)
    );
    println!(
      "      count: {}/{} | ttl: {:.1}-{:.1}h",
      user.count, user.limit, user.min_ttl_hours, user.max_ttl_hours
    );
    println!("      locators: {}", user.items_with_ttl.join(", "));
  }
}

fn print_over_limit(stats: &[UserStats]) {
  let over: Vec<&UserStats> = stats.iter().filter(|s| s.status == PoolStatus::OverLimit).collect();
  if over.is_empty() {
    return;
  }

  println!("users over limit:");
  for user in over {
    println!("  * {}{}", user.email, markers(user));
    println!(
      "    count: {}/{} | ttl: {:.1}-{:.1}h",
      user.count, user.limit, user.min_ttl_hours, user.max_ttl_hours
    );
    println!("    locators: {}", user.items_with_ttl.join(", "));
  }
}
