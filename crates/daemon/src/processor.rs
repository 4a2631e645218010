//! Detection processor: per-entry admission, observe-and-check, and
//! violation handling.

use std::sync::Arc;
use std::time::Duration;

use argus_core::{AlertPayload, CheckStatus, Config, DetectionMode, LogEntry};
use store::LocatorStore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::alerter::Notifier;
use crate::publisher::BlockPublisher;
use crate::side_effect::SideEffectHandle;

/// Timeout for the store call made by a delayed clear once its timer fires.
const CLEAR_OP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Processor {
  store: Arc<dyn LocatorStore>,
  publisher: Arc<dyn BlockPublisher>,
  alerter: Arc<dyn Notifier>,
  config: Arc<Config>,
  mode: DetectionMode,
  side_effects: SideEffectHandle,
  cancel: CancellationToken,
}

impl Processor {
  pub fn new(
    store: Arc<dyn LocatorStore>,
    publisher: Arc<dyn BlockPublisher>,
    alerter: Arc<dyn Notifier>,
    config: Arc<Config>,
    side_effects: SideEffectHandle,
    cancel: CancellationToken,
  ) -> Self {
    let mode = DetectionMode::from_config(&config);
    Self {
      store,
      publisher,
      alerter,
      config,
      mode,
      side_effects,
      cancel,
    }
  }

  pub fn mode(&self) -> DetectionMode {
    self.mode
  }

  /// Process one batch in arrival order. Each entry commits independently;
  /// cancellation between entries abandons the rest of the batch.
  pub async fn process_batch(&self, entries: Vec<LogEntry>) {
    for entry in entries {
      if self.cancel.is_cancelled() {
        info!("batch processing interrupted by shutdown");
        return;
      }
      self.process_entry(entry).await;
    }
  }

  async fn process_entry(&self, entry: LogEntry) {
    if self.config.excluded_users.contains(&entry.user_email) {
      return;
    }

    // in subnet mode, non-IPv4 sources are silently dropped
    let Some(locator) = self.mode.locator_for(&entry.source_ip, self.config.subnet_mask_ipv4) else {
      return;
    };

    let limit = self.config.limit_for(&entry.user_email, self.mode);

    let check = self.store.check_and_add(
      self.mode,
      &entry.user_email,
      &locator,
      limit,
      self.mode.locator_ttl(&self.config),
      self.config.alert_cooldown,
    );

    // abandon the in-flight store call if shutdown arrives mid-operation
    let result = tokio::select! {
      result = check => result,
      _ = self.cancel.cancelled() => {
        info!(user = %entry.user_email, "observe-and-check abandoned, shutting down");
        return;
      }
    };

    let result = match result {
      Ok(result) => result,
      Err(err) => {
        error!(user = %entry.user_email, "observe-and-check failed: {err}");
        return;
      }
    };

    match result.status {
      CheckStatus::Ok => {
        if result.is_new {
          info!(
            user = %entry.user_email,
            locator = %locator,
            count = result.current_count,
            limit,
            debug = self.config.is_debug_user(&entry.user_email),
            "new locator recorded"
          );
        }
      }
      CheckStatus::LimitCooldown => {
        // ongoing violation, already handled when the cooldown was armed
      }
      CheckStatus::LimitBlock => {
        self.handle_violation(&entry.user_email, limit, result.all_items);
      }
    }
  }

  /// First violation in this window: schedule the block publication, the
  /// operator alert, and the delayed state reset. The block list is filtered
  /// through the exclusion set; the alert payload is not.
  fn handle_violation(&self, user: &str, limit: u64, all_items: Vec<String>) {
    warn!(
      user = %user,
      count = all_items.len(),
      limit,
      debug = self.config.is_debug_user(user),
      "locator limit exceeded, dispatching block"
    );

    let excluded = self.config.excluded_locators(self.mode);
    let block_list: Vec<String> = all_items.iter().filter(|item| !excluded.contains(*item)).cloned().collect();
    for skipped in all_items.iter().filter(|item| excluded.contains(*item)) {
      info!(user = %user, locator = %skipped, "locator excluded from block list");
    }

    if !block_list.is_empty() {
      self.enqueue_publish(user, block_list);
      self.enqueue_delayed_clear(user);
    }

    self.enqueue_alert(user, limit, all_items);
  }

  fn enqueue_publish(&self, user: &str, block_list: Vec<String>) {
    let publisher = Arc::clone(&self.publisher);
    let duration = self.config.block_duration.clone();
    let user = user.to_string();

    self.side_effects.enqueue(
      "publish-block",
      Box::pin(async move {
        match publisher.publish_block(&block_list, &duration).await {
          Ok(()) => info!(user = %user, count = block_list.len(), "block directive published"),
          Err(err) => error!(user = %user, "failed to publish block directive: {err}"),
        }
      }),
    );
  }

  fn enqueue_alert(&self, user: &str, limit: u64, all_items: Vec<String>) {
    let alerter = Arc::clone(&self.alerter);
    let payload = AlertPayload {
      user_identifier: user.to_string(),
      detected_ips_count: all_items.len() as u64,
      limit,
      all_user_ips: all_items,
      block_duration: self.config.block_duration.clone(),
      violation_type: self.mode.violation_type().to_string(),
    };

    self.side_effects.enqueue(
      "send-alert",
      Box::pin(async move {
        let user = payload.user_identifier.clone();
        if let Err(err) = alerter.send_alert(payload).await {
          error!(user = %user, "failed to deliver alert: {err}");
        }
      }),
    );
  }

  /// Arm a timer that clears the user's locator state after the configured
  /// delay, so enforcement has propagated before the next window opens.
  /// Skipped if the service is shutting down when the timer fires; failures
  /// are logged and not retried.
  fn enqueue_delayed_clear(&self, user: &str) {
    let store = Arc::clone(&self.store);
    let cancel = self.cancel.clone();
    let mode = self.mode;
    let delay = self.config.clear_delay;
    let user = user.to_string();

    self.side_effects.enqueue(
      "delayed-clear",
      Box::pin(async move {
        info!(user = %user, ?delay, "scheduling delayed locator clear");
        tokio::spawn(async move {
          tokio::time::sleep(delay).await;
          if cancel.is_cancelled() {
            info!(user = %user, "delayed clear skipped, service stopping");
            return;
          }

          match tokio::time::timeout(CLEAR_OP_TIMEOUT, store.clear_user(mode, &user)).await {
            Ok(Ok(removed)) => info!(user = %user, removed, "delayed locator clear complete"),
            Ok(Err(err)) => warn!(user = %user, "delayed locator clear failed: {err}"),
            Err(_) => warn!(user = %user, "delayed locator clear timed out"),
          }
        });
      }),
    );
  }
}
