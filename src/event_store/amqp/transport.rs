//! Broker transport seam.
//!
//! `AmqpClient` owns state and topology rules; the transport only speaks the
//! wire protocol. The lapin-backed transport is compiled with the `amqp`
//! feature, tests substitute `MockAmqpTransport`.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::AmqpConnectionConfig;
use crate::event_store::{InboundMessage, Result};

/// Deliveries of one consumer, in broker order.
pub type DeliveryStream = BoxStream<'static, Result<InboundMessage>>;

/// Opens connections to a broker.
#[async_trait]
pub trait AmqpTransport: Send + Sync {
    /// Connect and open the single channel used for every operation.
    async fn connect(&self, config: &AmqpConnectionConfig) -> Result<Arc<dyn AmqpChannel>>;
}

/// One open channel on a broker connection.
#[async_trait]
pub trait AmqpChannel: Send + Sync {
    async fn declare_exchange(&self, name: &str, kind: &str) -> Result<()>;

    /// Declare a queue and return the name the broker assigned to it.
    async fn declare_queue(&self, name: &str, exclusive: bool) -> Result<String>;

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()>;

    /// Fire-and-forget publish. `exchange` is empty for the default exchange.
    async fn publish(&self, exchange: &str, routing_key: &str, body: &[u8]) -> Result<()>;

    /// Start consuming `queue`. Deliveries are not acknowledged until `ack`.
    async fn consume(&self, queue: &str) -> Result<DeliveryStream>;

    /// Acknowledge `delivery_tag`, and every earlier tag when `multiple`.
    async fn ack(&self, delivery_tag: u64, multiple: bool) -> Result<()>;

    /// Close the channel and its connection.
    async fn close(&self) -> Result<()>;
}

#[cfg(feature = "amqp")]
pub use lapin_transport::LapinTransport;

#[cfg(feature = "amqp")]
mod lapin_transport {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use futures::StreamExt;
    use lapin::{
        options::{
            BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions,
            QueueBindOptions, QueueDeclareOptions,
        },
        types::FieldTable,
        BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
    };
    use tracing::{error, info};

    use super::{AmqpChannel, AmqpTransport, DeliveryStream};
    use crate::config::AmqpConnectionConfig;
    use crate::event_store::{ClientError, InboundMessage, Result};

    /// Transport backed by lapin.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct LapinTransport;

    #[async_trait]
    impl AmqpTransport for LapinTransport {
        async fn connect(&self, config: &AmqpConnectionConfig) -> Result<Arc<dyn AmqpChannel>> {
            let target = config.display_target();
            let init_error = |message: String| ClientError::Init {
                target: target.clone(),
                message,
            };

            let connection = Connection::connect(&config.uri(), ConnectionProperties::default())
                .await
                .map_err(|e| init_error(e.to_string()))?;

            let broker = target.clone();
            connection.on_error(move |e| {
                error!(broker = %broker, error = %e, "AMQP connection error");
            });

            let channel = connection
                .create_channel()
                .await
                .map_err(|e| init_error(format!("Failed to create channel: {}", e)))?;

            let broker = target.clone();
            channel.on_error(move |e| {
                error!(broker = %broker, error = %e, "AMQP channel error");
            });

            info!(broker = %target, "Connected to AMQP");

            Ok(Arc::new(LapinChannel {
                connection,
                channel,
                consumer_seq: AtomicU64::new(0),
            }))
        }
    }

    struct LapinChannel {
        connection: Connection,
        channel: Channel,
        consumer_seq: AtomicU64,
    }

    fn exchange_kind(kind: &str) -> ExchangeKind {
        match kind {
            "direct" => ExchangeKind::Direct,
            "fanout" => ExchangeKind::Fanout,
            "topic" => ExchangeKind::Topic,
            "headers" => ExchangeKind::Headers,
            other => ExchangeKind::Custom(other.to_string()),
        }
    }

    #[async_trait]
    impl AmqpChannel for LapinChannel {
        async fn declare_exchange(&self, name: &str, kind: &str) -> Result<()> {
            self.channel
                .exchange_declare(
                    name,
                    exchange_kind(kind),
                    ExchangeDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    ClientError::Topology(format!("Failed to declare exchange {}: {}", name, e))
                })
        }

        async fn declare_queue(&self, name: &str, exclusive: bool) -> Result<String> {
            let queue = self
                .channel
                .queue_declare(
                    name,
                    QueueDeclareOptions {
                        durable: !exclusive,
                        exclusive,
                        auto_delete: exclusive,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    ClientError::Topology(format!("Failed to declare queue {}: {}", name, e))
                })?;
            Ok(queue.name().as_str().to_string())
        }

        async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
            self.channel
                .queue_bind(
                    queue,
                    exchange,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    ClientError::Topology(format!(
                        "Failed to bind queue {} to {}: {}",
                        queue, exchange, e
                    ))
                })
        }

        async fn publish(&self, exchange: &str, routing_key: &str, body: &[u8]) -> Result<()> {
            // Confirms are not awaited: the returned promise is dropped.
            self.channel
                .basic_publish(
                    exchange,
                    routing_key,
                    BasicPublishOptions::default(),
                    body,
                    BasicProperties::default(),
                )
                .await
                .map(|_confirm| ())
                .map_err(|e| ClientError::Publish(e.to_string()))
        }

        async fn consume(&self, queue: &str) -> Result<DeliveryStream> {
            let tag = format!(
                "chibi-consumer-{}",
                self.consumer_seq.fetch_add(1, Ordering::Relaxed)
            );
            let consumer = self
                .channel
                .basic_consume(
                    queue,
                    &tag,
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    ClientError::Subscribe(format!("Failed to consume {}: {}", queue, e))
                })?;

            info!(queue = %queue, consumer_tag = %tag, "Consuming queue");

            let deliveries = consumer.map(|delivery| {
                delivery
                    .map(|delivery| InboundMessage {
                        data: delivery.data,
                        exchange: delivery.exchange.as_str().to_string(),
                        routing_key: delivery.routing_key.as_str().to_string(),
                        delivery_tag: delivery.delivery_tag,
                    })
                    .map_err(|e| ClientError::Subscribe(e.to_string()))
            });
            Ok(deliveries.boxed())
        }

        async fn ack(&self, delivery_tag: u64, multiple: bool) -> Result<()> {
            self.channel
                .basic_ack(delivery_tag, BasicAckOptions { multiple })
                .await
                .map_err(|e| {
                    ClientError::Subscribe(format!("Failed to ack {}: {}", delivery_tag, e))
                })
        }

        async fn close(&self) -> Result<()> {
            self.connection
                .close(200, "OK")
                .await
                .map_err(|e| ClientError::Close(e.to_string()))
        }
    }
}
