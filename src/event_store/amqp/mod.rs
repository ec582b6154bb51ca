//! AMQP (RabbitMQ) event store client.
//!
//! One client owns exactly one connection and one channel. Connecting is
//! lazy: `init` opens the connection on first use and later calls reuse it.
//!
//! Topology setup runs before every publish and subscribe:
//! - an exchange marked `assert` is declared with its kind
//! - a queue marked `assert` or `exclusive` is declared; exclusive queues
//!   without a name get a broker-generated one
//! - a queue with `bind_to_exchange` is bound to it with an empty routing key

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{
    ClientError, EventStoreClient, MessageHandler, PublishTarget, Result, TopologyParams,
};
use crate::config::AmqpConnectionConfig;

pub mod transport;

pub use transport::{AmqpChannel, AmqpTransport, DeliveryStream};

enum ClientState {
    Uninitialized,
    Ready(Arc<dyn AmqpChannel>),
    Destroyed,
}

/// RabbitMQ client.
pub struct AmqpClient {
    config: AmqpConnectionConfig,
    transport: Arc<dyn AmqpTransport>,
    state: Mutex<ClientState>,
}

impl AmqpClient {
    /// Create a lapin-backed client. No connection is opened until `init`.
    #[cfg(feature = "amqp")]
    pub fn new(config: AmqpConnectionConfig) -> Self {
        Self::with_transport(config, Arc::new(transport::LapinTransport))
    }

    /// Create a client on a custom transport.
    pub fn with_transport(config: AmqpConnectionConfig, transport: Arc<dyn AmqpTransport>) -> Self {
        Self {
            config,
            transport,
            state: Mutex::new(ClientState::Uninitialized),
        }
    }

    async fn channel(&self) -> Result<Arc<dyn AmqpChannel>> {
        match &*self.state.lock().await {
            ClientState::Ready(channel) => Ok(channel.clone()),
            ClientState::Uninitialized => Err(ClientError::Topology(
                "Client is not initialized".to_string(),
            )),
            ClientState::Destroyed => Err(ClientError::Destroyed),
        }
    }

    /// Declare and bind what `params` asks for.
    ///
    /// Returns the broker-assigned queue name when a queue was declared.
    async fn setup_topology(
        channel: &dyn AmqpChannel,
        params: &TopologyParams,
    ) -> Result<Option<String>> {
        params.validate()?;

        if let Some(exchange) = params.exchange.as_ref().filter(|e| e.assert) {
            channel
                .declare_exchange(&exchange.name, &exchange.kind)
                .await?;
            debug!(exchange = %exchange.name, kind = %exchange.kind, "Asserted exchange");
        }

        let Some(queue) = &params.queue else {
            return Ok(None);
        };

        let mut declared = None;
        if queue.needs_declare() {
            let requested = queue.resolved_name().unwrap_or_default();
            let name = channel.declare_queue(requested, queue.exclusive).await?;
            debug!(queue = %name, exclusive = queue.exclusive, "Asserted queue");
            declared = Some(name);
        }

        if let Some(exchange) = &queue.bind_to_exchange {
            let name = declared
                .as_deref()
                .or_else(|| queue.resolved_name())
                .unwrap_or_default();
            channel.bind_queue(name, exchange, "").await?;
            debug!(queue = %name, exchange = %exchange, "Bound queue");
        }

        Ok(declared)
    }
}

#[async_trait]
impl EventStoreClient for AmqpClient {
    async fn init(&self) -> Result<()> {
        // The lock is held across connect so concurrent callers share one attempt.
        let mut state = self.state.lock().await;
        match &*state {
            ClientState::Ready(_) => Ok(()),
            ClientState::Destroyed => Err(ClientError::Destroyed),
            ClientState::Uninitialized => {
                let channel = self.transport.connect(&self.config).await?;
                *state = ClientState::Ready(channel);
                Ok(())
            }
        }
    }

    #[tracing::instrument(name = "event_store.publish", skip_all)]
    async fn publish(&self, params: &TopologyParams) -> Result<()> {
        let target = params.publish_target()?;
        let channel = self.channel().await?;

        Self::setup_topology(channel.as_ref(), params).await?;
        let body = params.encode_payload()?;

        match &target {
            PublishTarget::Exchange { name, routing_key } => {
                channel.publish(name, routing_key, &body).await?;
                debug!(exchange = %name, routing_key = %routing_key, bytes = body.len(), "Published");
            }
            PublishTarget::Queue(queue) => {
                channel.publish("", queue, &body).await?;
                debug!(queue = %queue, bytes = body.len(), "Published");
            }
        }
        Ok(())
    }

    #[tracing::instrument(name = "event_store.subscribe", skip_all)]
    async fn subscribe(
        &self,
        params: &TopologyParams,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        let channel = self.channel().await?;
        let declared = Self::setup_topology(channel.as_ref(), params).await?;

        let queue = declared
            .or_else(|| {
                params
                    .queue
                    .as_ref()
                    .and_then(|q| q.resolved_name())
                    .map(str::to_string)
            })
            .ok_or_else(|| ClientError::Subscribe("No queue configured".to_string()))?;

        let deliveries = channel.consume(&queue).await?;
        tokio::spawn(forward_deliveries(channel, queue.clone(), deliveries, handler));
        info!(queue = %queue, "Subscribed");
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, ClientState::Destroyed);
        if let ClientState::Ready(channel) = previous {
            channel.close().await?;
            info!(broker = %self.config.display_target(), "Closed AMQP connection");
        }
        Ok(())
    }
}

/// Ack every delivery cumulatively, then hand it to `handler`.
///
/// Deliveries are handled one at a time, in broker order.
async fn forward_deliveries(
    channel: Arc<dyn AmqpChannel>,
    queue: String,
    mut deliveries: DeliveryStream,
    handler: Arc<dyn MessageHandler>,
) {
    while let Some(delivery) = deliveries.next().await {
        match delivery {
            Ok(message) => {
                if let Err(e) = channel.ack(message.delivery_tag, true).await {
                    warn!(
                        queue = %queue,
                        delivery_tag = message.delivery_tag,
                        error = %e,
                        "Failed to ack delivery"
                    );
                }
                handler.handle(message).await;
            }
            Err(e) => {
                error!(queue = %queue, error = %e, "Consumer error");
                break;
            }
        }
    }
    debug!(queue = %queue, "Consumer stream ended");
}
