//! Block-directive publication to the enforcement bus.
//!
//! Directives go to a durable fanout exchange: every enforcement worker node
//! binds its own exclusive queue and applies the block locally. Publication
//! is fire-and-forget from the pipeline's perspective - a failed publish is
//! logged by the caller and the user's cooldown bounds the retry pressure.

use argus_core::BlockMessage;
use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum PublishError {
  #[error("amqp error: {0}")]
  Amqp(#[from] lapin::Error),
  #[error("failed to encode block message: {0}")]
  Encode(#[from] serde_json::Error),
}

/// Port through which the processor ships block directives.
#[async_trait]
pub trait BlockPublisher: Send + Sync {
  /// Publish a block directive for `items`, to be enforced for the opaque
  /// `duration` (forwarded verbatim, e.g. `"5m"`).
  async fn publish_block(&self, items: &[String], duration: &str) -> Result<(), PublishError>;
}

pub struct AmqpPublisher {
  // kept alive: dropping the connection would tear down the channel
  _connection: Connection,
  channel: Channel,
  exchange: String,
}

impl AmqpPublisher {
  /// Connect to the bus and declare the fanout exchange.
  ///
  /// The declaration is idempotent; enforcement workers declare the same
  /// exchange on their side.
  pub async fn connect(amqp_url: &str, exchange: &str) -> Result<Self, PublishError> {
    let connection = Connection::connect(amqp_url, ConnectionProperties::default()).await?;
    let channel = connection.create_channel().await?;

    channel
      .exchange_declare(
        exchange,
        ExchangeKind::Fanout,
        ExchangeDeclareOptions {
          durable: true,
          ..Default::default()
        },
        FieldTable::default(),
      )
      .await?;

    info!(%exchange, "connected to amqp, exchange declared");
    Ok(Self {
      _connection: connection,
      channel,
      exchange: exchange.to_string(),
    })
  }
}

#[async_trait]
impl BlockPublisher for AmqpPublisher {
  async fn publish_block(&self, items: &[String], duration: &str) -> Result<(), PublishError> {
    let message = BlockMessage {
      ips: items.to_vec(),
      duration: duration.to_string(),
    };
    let body = serde_json::to_vec(&message)?;

    // delivery_mode 2 = persistent; fanout exchanges ignore the routing key
    self
      .channel
      .basic_publish(
        &self.exchange,
        "",
        BasicPublishOptions::default(),
        &body,
        BasicProperties::default().with_delivery_mode(2),
      )
      .await?
      .await?;

    Ok(())
  }
}
