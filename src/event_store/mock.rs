//! Mock event store implementations for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedSender};
use futures::future::BoxFuture;
use futures::StreamExt;
use tokio::sync::{Mutex, RwLock};

use super::amqp::{AmqpChannel, AmqpTransport, DeliveryStream};
use super::{ClientError, EventStoreClient, InboundMessage, MessageHandler, Result, TopologyParams};
use crate::config::AmqpConnectionConfig;

// ============================================================================
// Handler
// ============================================================================

/// Handler that records every message it receives.
#[derive(Default)]
pub struct RecordingHandler {
    messages: Arc<Mutex<Vec<InboundMessage>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self) -> Vec<InboundMessage> {
        self.messages.lock().await.clone()
    }
}

impl MessageHandler for RecordingHandler {
    fn handle(&self, message: InboundMessage) -> BoxFuture<'static, ()> {
        let messages = self.messages.clone();
        Box::pin(async move {
            messages.lock().await.push(message);
        })
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Broker operation observed by `MockAmqpTransport`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    DeclareExchange {
        name: String,
        kind: String,
    },
    DeclareQueue {
        requested: String,
        exclusive: bool,
        assigned: String,
    },
    BindQueue {
        queue: String,
        exchange: String,
        routing_key: String,
    },
    Publish {
        exchange: String,
        routing_key: String,
        body: Vec<u8>,
    },
    Consume {
        queue: String,
    },
    Ack {
        delivery_tag: u64,
        multiple: bool,
    },
    Close,
}

#[derive(Default)]
struct BrokerState {
    connects: usize,
    fail_connect: bool,
    calls: Vec<BrokerCall>,
    consumers: HashMap<String, Vec<UnboundedSender<InboundMessage>>>,
    generated_queues: u64,
    next_delivery_tag: u64,
}

/// In-memory broker. Every connection shares one call log.
#[derive(Default)]
pub struct MockAmqpTransport {
    state: Arc<Mutex<BrokerState>>,
}

impl MockAmqpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_connect(&self, fail: bool) {
        self.state.lock().await.fail_connect = fail;
    }

    /// Number of connection attempts, failed ones included.
    pub async fn connect_count(&self) -> usize {
        self.state.lock().await.connects
    }

    pub async fn calls(&self) -> Vec<BrokerCall> {
        self.state.lock().await.calls.clone()
    }

    /// Push a message to every consumer of `queue`.
    ///
    /// Acks are recorded only when the consuming side sends them.
    pub async fn deliver(&self, queue: &str, data: Vec<u8>) {
        let mut state = self.state.lock().await;
        state.next_delivery_tag += 1;
        let delivery_tag = state.next_delivery_tag;
        if let Some(consumers) = state.consumers.get_mut(queue) {
            consumers.retain(|consumer| {
                consumer
                    .unbounded_send(InboundMessage {
                        data: data.clone(),
                        exchange: String::new(),
                        routing_key: queue.to_string(),
                        delivery_tag,
                    })
                    .is_ok()
            });
        }
    }
}

#[async_trait]
impl AmqpTransport for MockAmqpTransport {
    async fn connect(&self, config: &AmqpConnectionConfig) -> Result<Arc<dyn AmqpChannel>> {
        let mut state = self.state.lock().await;
        state.connects += 1;
        if state.fail_connect {
            return Err(ClientError::Init {
                target: config.display_target(),
                message: "Mock connection refused".to_string(),
            });
        }
        Ok(Arc::new(MockAmqpChannel {
            state: self.state.clone(),
        }))
    }
}

struct MockAmqpChannel {
    state: Arc<Mutex<BrokerState>>,
}

#[async_trait]
impl AmqpChannel for MockAmqpChannel {
    async fn declare_exchange(&self, name: &str, kind: &str) -> Result<()> {
        self.state.lock().await.calls.push(BrokerCall::DeclareExchange {
            name: name.to_string(),
            kind: kind.to_string(),
        });
        Ok(())
    }

    async fn declare_queue(&self, name: &str, exclusive: bool) -> Result<String> {
        let mut state = self.state.lock().await;
        let assigned = if name.is_empty() {
            state.generated_queues += 1;
            format!("amq.gen-{}", state.generated_queues)
        } else {
            name.to_string()
        };
        state.calls.push(BrokerCall::DeclareQueue {
            requested: name.to_string(),
            exclusive,
            assigned: assigned.clone(),
        });
        Ok(assigned)
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        self.state.lock().await.calls.push(BrokerCall::BindQueue {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
        });
        Ok(())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, body: &[u8]) -> Result<()> {
        self.state.lock().await.calls.push(BrokerCall::Publish {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body: body.to_vec(),
        });
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<DeliveryStream> {
        let (tx, rx) = mpsc::unbounded();
        let mut state = self.state.lock().await;
        state.calls.push(BrokerCall::Consume {
            queue: queue.to_string(),
        });
        state
            .consumers
            .entry(queue.to_string())
            .or_default()
            .push(tx);
        Ok(rx.map(Ok).boxed())
    }

    async fn ack(&self, delivery_tag: u64, multiple: bool) -> Result<()> {
        self.state.lock().await.calls.push(BrokerCall::Ack {
            delivery_tag,
            multiple,
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(BrokerCall::Close);
        state.consumers.clear();
        Ok(())
    }
}

// ============================================================================
// Client
// ============================================================================

/// Mock event store client for testing.
#[derive(Default)]
pub struct MockEventStoreClient {
    init_count: RwLock<usize>,
    published: RwLock<Vec<TopologyParams>>,
    handlers: RwLock<Vec<Arc<dyn MessageHandler>>>,
    subscriptions: RwLock<Vec<TopologyParams>>,
    fail_on_publish: RwLock<bool>,
    destroyed: RwLock<bool>,
}

impl MockEventStoreClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn init_count(&self) -> usize {
        *self.init_count.read().await
    }

    pub async fn published(&self) -> Vec<TopologyParams> {
        self.published.read().await.clone()
    }

    pub async fn subscriptions(&self) -> Vec<TopologyParams> {
        self.subscriptions.read().await.clone()
    }

    pub async fn is_destroyed(&self) -> bool {
        *self.destroyed.read().await
    }

    /// Deliver `data` to every subscribed handler, in subscription order.
    pub async fn deliver(&self, data: impl Into<Vec<u8>>) {
        let data = data.into();
        let handlers = self.handlers.read().await.clone();
        for handler in handlers {
            handler.handle(InboundMessage::new(data.clone())).await;
        }
    }
}

#[async_trait]
impl EventStoreClient for MockEventStoreClient {
    async fn init(&self) -> Result<()> {
        *self.init_count.write().await += 1;
        Ok(())
    }

    async fn publish(&self, params: &TopologyParams) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(ClientError::Publish("Mock publish failure".to_string()));
        }
        self.published.write().await.push(params.clone());
        Ok(())
    }

    async fn subscribe(
        &self,
        params: &TopologyParams,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        self.subscriptions.write().await.push(params.clone());
        self.handlers.write().await.push(handler);
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        *self.destroyed.write().await = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::QueueConfig;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_client_records_publishes() {
        let client = MockEventStoreClient::new();
        let params = TopologyParams::default()
            .with_queue(QueueConfig::named("orders"))
            .with_payload(json!({"id": 1}));

        client.publish(&params).await.unwrap();
        assert_eq!(client.published().await, vec![params]);
    }

    #[tokio::test]
    async fn test_mock_client_fail_on_publish() {
        let client = MockEventStoreClient::new();
        client.set_fail_on_publish(true).await;

        let result = client.publish(&TopologyParams::default()).await;
        assert!(matches!(result, Err(ClientError::Publish(_))));
        assert!(client.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_mock_client_delivers_to_handlers() {
        let client = MockEventStoreClient::new();
        let handler = Arc::new(RecordingHandler::new());
        client
            .subscribe(&TopologyParams::default(), handler.clone())
            .await
            .unwrap();

        client.deliver(b"ping".to_vec()).await;
        assert_eq!(handler.messages().await[0].data, b"ping".to_vec());
    }

    #[tokio::test]
    async fn test_mock_transport_generates_queue_names() {
        let transport = MockAmqpTransport::new();
        let channel = transport
            .connect(&AmqpConnectionConfig::default())
            .await
            .unwrap();

        assert_eq!(channel.declare_queue("", true).await.unwrap(), "amq.gen-1");
        assert_eq!(channel.declare_queue("", true).await.unwrap(), "amq.gen-2");
        assert_eq!(channel.declare_queue("jobs", false).await.unwrap(), "jobs");
    }

    #[tokio::test]
    async fn test_mock_transport_streams_unacked_deliveries() {
        let transport = MockAmqpTransport::new();
        let channel = transport
            .connect(&AmqpConnectionConfig::default())
            .await
            .unwrap();

        let mut deliveries = channel.consume("jobs").await.unwrap();
        transport.deliver("jobs", b"run".to_vec()).await;

        let message = deliveries.next().await.unwrap().unwrap();
        assert_eq!(message.data, b"run".to_vec());
        assert_eq!(message.delivery_tag, 1);
        assert!(!transport
            .calls()
            .await
            .iter()
            .any(|c| matches!(c, BrokerCall::Ack { .. })));

        channel.ack(message.delivery_tag, true).await.unwrap();
        assert_eq!(
            transport.calls().await.last(),
            Some(&BrokerCall::Ack {
                delivery_tag: 1,
                multiple: true,
            })
        );
    }
}
