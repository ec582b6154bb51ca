//! Subscriber and hook configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ActionConfig;
use crate::event_store::TopologyParams;

/// How inbound message bodies are decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    #[default]
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadConfig {
    pub parse_as: ParseMode,
}

/// One persistent subscription and the pipeline it drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// Source event store name.
    pub from: String,
    /// Trailing-edge debounce window, e.g. `"200ms"` or `"2s"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce: Option<String>,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
    /// Broker-specific subscribe parameters.
    #[serde(default)]
    pub params: TopologyParams,
    #[serde(default)]
    pub payload: PayloadConfig,
}

impl SubscriberConfig {
    pub fn new(from: impl Into<String>, params: TopologyParams) -> Self {
        Self {
            from: from.into(),
            debounce: None,
            actions: Vec::new(),
            params,
            payload: PayloadConfig::default(),
        }
    }

    pub fn with_debounce(mut self, debounce: impl Into<String>) -> Self {
        self.debounce = Some(debounce.into());
        self
    }

    pub fn with_action(mut self, action: ActionConfig) -> Self {
        self.actions.push(action);
        self
    }
}

/// Parse a debounce window: a humantime duration or bare milliseconds.
/// Zero and malformed values yield `None`.
pub fn parse_debounce(value: &str) -> Option<Duration> {
    let value = value.trim();
    // A bare number is milliseconds.
    let window = match value.parse::<u64>() {
        Ok(ms) => Duration::from_millis(ms),
        Err(_) => humantime::parse_duration(value).ok()?,
    };
    Some(window).filter(|window| !window.is_zero())
}

/// Action list of one hook phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookConfig {
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

/// Startup and shutdown hooks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookListConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup: Option<HookConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutdown: Option<HookConfig>,
}
