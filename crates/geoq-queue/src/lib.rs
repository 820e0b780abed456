//! AMQP 0-9-1 client for the `query_queue` worker queue: durable queue
//! declaration, persistent-message publish, and a prefetch-bounded
//! consumer whose deliveries ack on the channel that received them
//! (a `lapin::Acker` already carries that channel, so callers cannot
//! accidentally ack on the wrong one).

use std::sync::Arc;

use geoq_entities::message::{self, QueueMessage};
use lapin::options::{
  BasicAckOptions, BasicConsumeOptions, BasicPublishOptions,
  BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};

pub use lapin::message::Delivery;
pub use lapin::Consumer;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
  #[error("AMQP error: {0}")]
  Lapin(#[from] lapin::Error),
  #[error("message codec error: {0}")]
  Codec(#[from] message::MessageCodecError),
}

pub type Result<T> = std::result::Result<T, QueueError>;

async fn connect(addr: &str) -> Result<Connection> {
  let options = ConnectionProperties::default()
    .with_executor(tokio_executor_trait::Tokio::current())
    .with_reactor(tokio_reactor_trait::Tokio);
  Ok(Connection::connect(addr, options).await?)
}

async fn declare_query_queue(channel: &Channel) -> Result<()> {
  channel
    .queue_declare(
      message::QUEUE_NAME,
      QueueDeclareOptions { durable: true, ..Default::default() },
      FieldTable::default(),
    )
    .await?;
  Ok(())
}

/// A connection used only to publish. Safe to share across concurrent
/// handlers behind an `Arc` — `lapin::Channel` is cheap to clone and
/// internally synchronized.
#[derive(Clone)]
pub struct QueuePublisher {
  channel: Channel,
  separator: char,
}

impl QueuePublisher {
  pub async fn connect(addr: &str, separator: char) -> Result<Self> {
    let connection = connect(addr).await?;
    let channel = connection.create_channel().await?;
    declare_query_queue(&channel).await?;
    // Leak the connection's lifetime into the channel: lapin channels
    // keep their connection alive via an internal Arc, so dropping
    // `connection` here is safe once `channel` has been created.
    Ok(Self { channel, separator })
  }

  pub async fn publish(&self, message: &QueueMessage) -> Result<()> {
    let body = message::encode(message, self.separator)?;
    self
      .channel
      .basic_publish(
        "",
        message::QUEUE_NAME,
        BasicPublishOptions::default(),
        body.as_bytes(),
        BasicProperties::default().with_delivery_mode(2), // persistent
      )
      .await?
      .await?;
    Ok(())
  }
}

/// A connection used only to consume, with a bounded prefetch. Wraps
/// an owning [`Connection`] so the socket stays open for the
/// consumer's lifetime.
pub struct QueueConsumer {
  _connection: Connection,
  channel: Channel,
  consumer: Consumer,
  separator: char,
}

impl QueueConsumer {
  pub async fn connect(
    addr: &str,
    consumer_tag: &str,
    prefetch: u16,
    separator: char,
  ) -> Result<Self> {
    let connection = connect(addr).await?;
    let channel = connection.create_channel().await?;
    declare_query_queue(&channel).await?;
    channel
      .basic_qos(prefetch, BasicQosOptions::default())
      .await?;
    let consumer = channel
      .basic_consume(
        message::QUEUE_NAME,
        consumer_tag,
        BasicConsumeOptions::default(),
        FieldTable::default(),
      )
      .await?;
    Ok(Self {
      _connection: connection,
      channel,
      consumer,
      separator,
    })
  }

  /// Pulls the next delivery, decoded. `None` means the consumer's
  /// stream has ended (connection closed); callers should treat this
  /// as fatal and reconnect.
  pub async fn next(
    &mut self,
  ) -> Option<Result<(QueueMessage, Delivery)>> {
    use futures_util::StreamExt;
    let delivery = match self.consumer.next().await? {
      Ok(d) => d,
      Err(e) => return Some(Err(e.into())),
    };
    match message::decode(&delivery.data, self.separator) {
      Ok(msg) => Some(Ok((msg, delivery))),
      Err(e) => Some(Err(e.into())),
    }
  }

  /// Channel the consumer is bound to, exposed for diagnostics only —
  /// acking always goes through [`ack`], never this handle directly.
  pub fn channel(&self) -> &Channel {
    &self.channel
  }
}

/// Acks a delivery on the channel it was received on. `lapin`'s
/// `Acker` is bound to that channel internally, so this is the only
/// correct way to acknowledge — never construct a fresh channel to do
/// it, even if one is conveniently at hand.
pub async fn ack(delivery: &Delivery) -> Result<()> {
  delivery.ack(BasicAckOptions::default()).await?;
  Ok(())
}

/// Convenience for `Arc`-shared publishers handed to many handlers.
pub type SharedPublisher = Arc<QueuePublisher>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn queue_error_wraps_codec_error() {
    let err: QueueError =
      message::MessageCodecError::InvalidUtf8.into();
    assert!(matches!(err, QueueError::Codec(_)));
  }
}
