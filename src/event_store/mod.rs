//! Event store clients.
//!
//! This module contains:
//! - `EventStoreClient` trait: connect, publish, subscribe, disconnect
//! - `MessageHandler` trait: receives inbound deliveries
//! - Topology descriptors shared by publish and subscribe
//! - Implementations: AMQP (RabbitMQ), Noop, Mock
//! - `EventStoreManager`: named registry built from configuration

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::config::{EventStoreConfig, EventStoreType};

pub mod amqp;
pub mod manager;
pub mod mock;
pub mod noop;
pub mod topology;

pub use amqp::AmqpClient;
pub use manager::{EventStoreManager, RegisteredStore};
pub use noop::NoopClient;
pub use topology::{ExchangeConfig, PublishTarget, QueueConfig, TopologyParams};

// ============================================================================
// Traits
// ============================================================================

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur during event store operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to connect to {target}: {message}")]
    Init { target: String, message: String },

    #[error("Topology error: {0}")]
    Topology(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Close failed: {0}")]
    Close(String),

    #[error("Client has been destroyed")]
    Destroyed,

    #[error("Unsupported event store: {0}")]
    Unsupported(String),
}

/// A message received from a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Raw message body.
    pub data: Vec<u8>,
    /// Exchange the message was published to; empty for the default exchange.
    pub exchange: String,
    pub routing_key: String,
    pub delivery_tag: u64,
}

impl InboundMessage {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            exchange: String::new(),
            routing_key: String::new(),
            delivery_tag: 0,
        }
    }
}

/// Handler for inbound deliveries.
///
/// Deliveries of one subscription are handed over in order; the client awaits
/// each returned future before forwarding the next message.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, message: InboundMessage) -> BoxFuture<'static, ()>;
}

/// Interface to a message broker.
///
/// Implementations:
/// - `AmqpClient`: RabbitMQ via AMQP 0-9-1
/// - `NoopClient`: accepts and discards every call
/// - `MockEventStoreClient`: in-memory recorder for testing
#[async_trait]
pub trait EventStoreClient: Send + Sync {
    /// Open the connection. Idempotent; concurrent callers share one attempt.
    async fn init(&self) -> Result<()>;

    /// Publish `params.payload` to the exchange or queue named in `params`.
    async fn publish(&self, params: &TopologyParams) -> Result<()>;

    /// Consume from the queue named in `params`, forwarding every delivery
    /// to `handler` for the lifetime of the connection.
    async fn subscribe(&self, params: &TopologyParams, handler: Arc<dyn MessageHandler>)
        -> Result<()>;

    /// Close the connection. Idempotent.
    async fn destroy(&self) -> Result<()>;
}

// ============================================================================
// Factory
// ============================================================================

/// Build the client for one configured event store.
pub fn create_client(config: &EventStoreConfig) -> Result<Arc<dyn EventStoreClient>> {
    match config.store_type {
        EventStoreType::Rabbitmq => {
            let connection = config.rabbitmq.clone().ok_or_else(|| {
                ClientError::InvalidRequest(format!(
                    "event store {} is missing its rabbitmq connection",
                    config.name
                ))
            })?;
            create_amqp_client(connection)
        }
        EventStoreType::Noop => Ok(Arc::new(NoopClient)),
    }
}

#[cfg(feature = "amqp")]
fn create_amqp_client(
    connection: crate::config::AmqpConnectionConfig,
) -> Result<Arc<dyn EventStoreClient>> {
    Ok(Arc::new(AmqpClient::new(connection)))
}

#[cfg(not(feature = "amqp"))]
fn create_amqp_client(
    _connection: crate::config::AmqpConnectionConfig,
) -> Result<Arc<dyn EventStoreClient>> {
    Err(ClientError::Unsupported(
        "rabbitmq requires the 'amqp' feature. Rebuild with --features amqp".to_string(),
    ))
}
