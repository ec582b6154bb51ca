//! Queue/exchange topology descriptors shared by publish and subscribe.
//!
//! Name resolution rules:
//! - an exclusive queue without a declared name resolves to `""`, letting the
//!   broker generate one
//! - otherwise the declared queue name is used
//! - an exclusive queue must declare `bind_to_exchange`, or nothing could ever
//!   route messages into it

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ClientError, Result};

/// Queue parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Create the queue if it does not exist.
    pub assert: bool,
    /// Queue is private to this connection and deleted with it.
    pub exclusive: bool,
    /// Exchange to bind the queue to (empty routing key).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_to_exchange: Option<String>,
}

impl QueueConfig {
    /// Named queue, used as-is.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Broker-named exclusive queue bound to `exchange`.
    pub fn exclusive(exchange: impl Into<String>) -> Self {
        Self {
            exclusive: true,
            bind_to_exchange: Some(exchange.into()),
            ..Default::default()
        }
    }

    pub fn with_assert(mut self) -> Self {
        self.assert = true;
        self
    }

    /// Resolved queue name, `None` when the queue cannot be addressed.
    pub fn resolved_name(&self) -> Option<&str> {
        match (&self.name, self.exclusive) {
            (Some(name), _) => Some(name.as_str()),
            (None, true) => Some(""),
            (None, false) => None,
        }
    }

    /// Whether topology setup declares this queue.
    pub fn needs_declare(&self) -> bool {
        self.assert || self.exclusive
    }
}

/// Exchange parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub name: String,
    /// Create the exchange if it does not exist.
    #[serde(default)]
    pub assert: bool,
    /// Exchange kind: `direct`, `fanout`, `topic`, `headers` or a plugin kind.
    #[serde(rename = "type")]
    pub kind: String,
}

impl ExchangeConfig {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            assert: false,
            kind: kind.into(),
        }
    }

    pub fn with_assert(mut self) -> Self {
        self.assert = true;
        self
    }
}

/// Parameters of one publish or subscribe call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<ExchangeConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_key: Option<String>,
    /// Message body for publish calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Where a publish call sends its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishTarget {
    /// Publish through an exchange with a routing key.
    Exchange { name: String, routing_key: String },
    /// Send directly to a queue through the default exchange.
    Queue(String),
}

impl TopologyParams {
    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_exchange(mut self, exchange: ExchangeConfig) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<()> {
        if let Some(queue) = &self.queue {
            if queue.exclusive && queue.bind_to_exchange.is_none() {
                return Err(ClientError::Topology(format!(
                    "exclusive queue {} must declare bind_to_exchange",
                    queue.name.as_deref().unwrap_or("<generated>")
                )));
            }
        }
        Ok(())
    }

    /// Resolve the publish target. The exchange wins when both are present.
    pub fn publish_target(&self) -> Result<PublishTarget> {
        if let Some(exchange) = &self.exchange {
            return Ok(PublishTarget::Exchange {
                name: exchange.name.clone(),
                routing_key: self.routing_key.clone().unwrap_or_default(),
            });
        }

        match &self.queue {
            Some(queue) => match &queue.name {
                Some(name) => Ok(PublishTarget::Queue(name.clone())),
                None => Err(ClientError::InvalidRequest(
                    "Publishing to a queue requires a queue name".to_string(),
                )),
            },
            None => Err(ClientError::InvalidRequest(
                "Provide either exchange or queue".to_string(),
            )),
        }
    }

    /// Encode the payload into message bytes.
    ///
    /// Objects, arrays and null are JSON-encoded, strings are sent verbatim and
    /// numbers as their decimal text. Booleans and a missing payload are rejected.
    pub fn encode_payload(&self) -> Result<Vec<u8>> {
        match &self.payload {
            Some(Value::String(text)) => Ok(text.as_bytes().to_vec()),
            Some(Value::Number(number)) => Ok(number.to_string().into_bytes()),
            Some(value @ (Value::Object(_) | Value::Array(_) | Value::Null)) => {
                serde_json::to_vec(value).map_err(|e| {
                    ClientError::InvalidRequest(format!("Payload cannot be encoded: {}", e))
                })
            }
            Some(Value::Bool(_)) | None => Err(ClientError::InvalidRequest(
                "Payload should be a string, a number or a JSON object".to_string(),
            )),
        }
    }
}
