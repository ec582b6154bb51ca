//! AMQP/RabbitMQ event store integration tests using testcontainers.
//!
//! Run with: cargo test --test amqp_client --features amqp -- --nocapture
//!
//! These tests spin up RabbitMQ in a container using testcontainers-rs.
//! No manual RabbitMQ setup required.

use std::sync::Arc;
use std::time::Duration;

use chibi::config::AmqpConnectionConfig;
use chibi::event_store::{
    AmqpClient, ClientError, EventStoreClient, ExchangeConfig, InboundMessage, MessageHandler,
    QueueConfig, TopologyParams,
};
use futures::future::BoxFuture;
use lapin::{options::QueueDeclareOptions, types::FieldTable, Connection, ConnectionProperties};
use serde_json::json;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    GenericImage, ImageExt,
};
use tokio::sync::mpsc;

/// Start RabbitMQ container.
///
/// Returns (container, connection) where connection targets the mapped port.
async fn start_rabbitmq() -> (
    testcontainers::ContainerAsync<GenericImage>,
    AmqpConnectionConfig,
) {
    let image = GenericImage::new("rabbitmq", "3-management")
        .with_exposed_port(5672.tcp())
        .with_wait_for(WaitFor::message_on_stdout("Server startup complete"));

    let container = image
        .with_startup_timeout(Duration::from_secs(60))
        .start()
        .await
        .expect("Failed to start rabbitmq container");

    // Brief delay to ensure RabbitMQ is fully ready
    tokio::time::sleep(Duration::from_secs(2)).await;

    let port = container
        .get_host_port_ipv4(5672)
        .await
        .expect("Failed to get mapped port");

    let host = container
        .get_host()
        .await
        .expect("Failed to get container host");

    let connection = AmqpConnectionConfig {
        hostname: host.to_string(),
        port,
        ..Default::default()
    };

    println!("RabbitMQ available at: {}", connection.display_target());

    (container, connection)
}

/// Forwards every delivery to a channel.
struct ChannelHandler {
    tx: mpsc::UnboundedSender<InboundMessage>,
}

impl MessageHandler for ChannelHandler {
    fn handle(&self, message: InboundMessage) -> BoxFuture<'static, ()> {
        let _ = self.tx.send(message);
        Box::pin(async {})
    }
}

fn channel_handler() -> (Arc<ChannelHandler>, mpsc::UnboundedReceiver<InboundMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelHandler { tx }), rx)
}

/// Ready-message count of `queue`, read with a passive declare on a fresh connection.
async fn ready_messages(connection: &AmqpConnectionConfig, queue: &str) -> u32 {
    let conn = Connection::connect(&connection.uri(), ConnectionProperties::default())
        .await
        .expect("Failed to connect for inspection");
    let channel = conn.create_channel().await.expect("Failed to open channel");
    let declared = channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                passive: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .expect("Passive declare failed");
    let count = declared.message_count();
    conn.close(200, "OK").await.expect("Failed to close");
    count
}

async fn receive(rx: &mut mpsc::UnboundedReceiver<InboundMessage>) -> InboundMessage {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("Timed out waiting for delivery")
        .expect("Handler channel closed")
}

#[tokio::test]
async fn test_fanout_exchange_reaches_exclusive_queue() {
    let (_container, connection) = start_rabbitmq().await;

    let subscriber = AmqpClient::new(connection.clone());
    subscriber.init().await.expect("subscriber init");

    // The exchange must exist before the exclusive queue is bound to it.
    let publisher = AmqpClient::new(connection);
    publisher.init().await.expect("publisher init");
    let exchange = ExchangeConfig::new("events", "fanout").with_assert();
    publisher
        .publish(
            &TopologyParams::default()
                .with_exchange(exchange.clone())
                .with_payload(json!({"warmup": true})),
        )
        .await
        .expect("warmup publish");

    let (handler, mut rx) = channel_handler();
    subscriber
        .subscribe(
            &TopologyParams::default().with_queue(QueueConfig::exclusive("events")),
            handler,
        )
        .await
        .expect("subscribe");

    publisher
        .publish(
            &TopologyParams::default()
                .with_exchange(exchange)
                .with_payload(json!({"x": 1})),
        )
        .await
        .expect("publish");

    let message = receive(&mut rx).await;
    assert_eq!(message.data, br#"{"x":1}"#.to_vec());
    assert_eq!(message.exchange, "events");

    publisher.destroy().await.expect("publisher destroy");
    subscriber.destroy().await.expect("subscriber destroy");
}

#[tokio::test]
async fn test_asserted_queue_roundtrip_in_order() {
    let (_container, connection) = start_rabbitmq().await;

    let client = AmqpClient::new(connection.clone());
    client.init().await.expect("init");
    client.init().await.expect("second init is a no-op");

    let queue = QueueConfig::named("orders").with_assert();
    let (handler, mut rx) = channel_handler();
    client
        .subscribe(&TopologyParams::default().with_queue(queue.clone()), handler)
        .await
        .expect("subscribe");

    for payload in [json!({"amount": 150}), json!("restart"), json!(42)] {
        client
            .publish(
                &TopologyParams::default()
                    .with_queue(queue.clone())
                    .with_payload(payload),
            )
            .await
            .expect("publish");
    }

    let first = receive(&mut rx).await;
    let second = receive(&mut rx).await;
    let third = receive(&mut rx).await;
    assert_eq!(first.data, br#"{"amount":150}"#.to_vec());
    assert_eq!(second.data, b"restart".to_vec());
    assert_eq!(third.data, b"42".to_vec());
    assert!(first.delivery_tag < second.delivery_tag);
    assert!(second.delivery_tag < third.delivery_tag);

    tokio::time::sleep(Duration::from_millis(500)).await;
    client.destroy().await.expect("destroy");
    client.destroy().await.expect("second destroy is a no-op");

    // Unacked deliveries would be requeued when the connection closed.
    assert_eq!(ready_messages(&connection, "orders").await, 0);
}

#[tokio::test]
async fn test_publish_without_target_is_rejected() {
    let (_container, connection) = start_rabbitmq().await;

    let client = AmqpClient::new(connection);
    client.init().await.expect("init");

    let result = client
        .publish(&TopologyParams::default().with_payload(json!({"x": 1})))
        .await;
    assert!(matches!(result, Err(ClientError::InvalidRequest(_))));

    client.destroy().await.expect("destroy");
}

#[tokio::test]
async fn test_connection_refused_is_init_error() {
    let client = AmqpClient::new(AmqpConnectionConfig {
        hostname: "127.0.0.1".to_string(),
        port: 1,
        ..Default::default()
    });

    assert!(matches!(client.init().await, Err(ClientError::Init { .. })));
}
