//! Operator alerting over an outbound webhook.

use std::time::Duration;

use argus_core::AlertPayload;
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum AlertError {
  #[error("webhook request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("webhook returned {0}")]
  Status(reqwest::StatusCode),
}

/// Port through which the processor delivers alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
  async fn send_alert(&self, payload: AlertPayload) -> Result<(), AlertError>;
}

/// Webhook alerter. An empty webhook URL disables alerting entirely; sends
/// become no-ops so the pipeline does not need a separate code path.
pub struct WebhookAlerter {
  client: reqwest::Client,
  url: Option<String>,
}

impl WebhookAlerter {
  pub fn new(webhook_url: &str) -> Self {
    let url = if webhook_url.is_empty() {
      None
    } else {
      Some(webhook_url.to_string())
    };

    Self {
      client: reqwest::Client::new(),
      url,
    }
  }

  pub fn is_enabled(&self) -> bool {
    self.url.is_some()
  }
}

#[async_trait]
impl Notifier for WebhookAlerter {
  async fn send_alert(&self, payload: AlertPayload) -> Result<(), AlertError> {
    let Some(url) = &self.url else {
      debug!(user = %payload.user_identifier, "alerting disabled, dropping alert");
      return Ok(());
    };

    let response = self
      .client
      .post(url)
      .timeout(REQUEST_TIMEOUT)
      .json(&payload)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      return Err(AlertError::Status(status));
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_url_disables_alerting() {
    assert!(!WebhookAlerter::new("").is_enabled());
    assert!(WebhookAlerter::new("http://hooks.internal/alert").is_enabled());
  }

  #[tokio::test]
  async fn disabled_alerter_is_a_noop() {
    let alerter = WebhookAlerter::new("");
    let payload = AlertPayload {
      user_identifier: "u@example.com".into(),
      detected_ips_count: 4,
      limit: 3,
      all_user_ips: vec![],
      block_duration: "5m".into(),
      violation_type: "ip_limit_exceeded".into(),
    };
    assert!(alerter.send_alert(payload).await.is_ok());
  }
}
