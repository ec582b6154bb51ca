//! Event store configuration types.

use serde::{Deserialize, Serialize};
use url::Url;

/// Event store type discriminator.
///
/// Anything other than a known broker kind (including an absent `type`)
/// resolves to the no-op store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStoreType {
    /// AMQP 0-9-1 broker (RabbitMQ).
    Rabbitmq,
    /// Store that accepts every call and does nothing.
    #[default]
    #[serde(other)]
    Noop,
}

/// Named event store (discriminated union).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventStoreConfig {
    /// Unique name referenced by subscribers and publish actions.
    pub name: String,
    /// Event store type discriminator.
    #[serde(rename = "type", default)]
    pub store_type: EventStoreType,
    /// RabbitMQ connection parameters, required when `type: rabbitmq`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rabbitmq: Option<AmqpConnectionConfig>,
}

impl EventStoreConfig {
    /// Create a RabbitMQ event store config.
    pub fn rabbitmq(name: impl Into<String>, connection: AmqpConnectionConfig) -> Self {
        Self {
            name: name.into(),
            store_type: EventStoreType::Rabbitmq,
            rabbitmq: Some(connection),
        }
    }

    /// Create a no-op event store config.
    pub fn noop(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store_type: EventStoreType::Noop,
            rabbitmq: None,
        }
    }
}

/// AMQP connection parameters.
///
/// Either a full `url`, or discrete fields that are rendered into one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmqpConnectionConfig {
    /// Full AMQP URI. Takes precedence over the discrete fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// `amqp` or `amqps`.
    pub protocol: String,
    pub hostname: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub vhost: String,
    /// Heartbeat interval in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_max: Option<u32>,
}

impl Default for AmqpConnectionConfig {
    fn default() -> Self {
        Self {
            url: None,
            protocol: "amqp".to_string(),
            hostname: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            heartbeat: None,
            frame_max: None,
        }
    }
}

impl AmqpConnectionConfig {
    /// Create config from a full AMQP URI.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// AMQP URI used to open the connection.
    pub fn uri(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }

        let mut uri = format!(
            "{}://{}:{}@{}:{}/{}",
            self.protocol,
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
            self.hostname,
            self.port,
            urlencoding::encode(&self.vhost),
        );

        let mut query = Vec::new();
        if let Some(heartbeat) = self.heartbeat {
            query.push(format!("heartbeat={}", heartbeat));
        }
        if let Some(frame_max) = self.frame_max {
            query.push(format!("frame_max={}", frame_max));
        }
        if !query.is_empty() {
            uri.push('?');
            uri.push_str(&query.join("&"));
        }

        uri
    }

    /// Broker address without credentials, for logging.
    pub fn display_target(&self) -> String {
        match &self.url {
            Some(url) => match Url::parse(url) {
                Ok(mut parsed) => {
                    // Only fails for cannot-be-a-base URLs, which carry no credentials.
                    let _ = parsed.set_username("");
                    let _ = parsed.set_password(None);
                    parsed.to_string()
                }
                Err(_) => "<invalid amqp url>".to_string(),
            },
            None => format!("{}:{}{}", self.hostname, self.port, display_vhost(&self.vhost)),
        }
    }
}

fn display_vhost(vhost: &str) -> String {
    if vhost.starts_with('/') {
        vhost.to_string()
    } else {
        format!("/{}", vhost)
    }
}
