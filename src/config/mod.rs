//! Application configuration.
//!
//! Loads the YAML configuration tree (`event_stores`, `hooks`, `subscribers`,
//! `log_level`, `vars`), expands `${ENV:NAME}` references in every string
//! value, and validates cross-references before anything connects.

mod action;
mod event_store;
mod subscriber;

pub use action::{ActionConfig, ActionKind, PublishParams, ShellParams};
pub use event_store::{AmqpConnectionConfig, EventStoreConfig, EventStoreType};
pub use subscriber::{
    parse_debounce, HookConfig, HookListConfig, ParseMode, PayloadConfig, SubscriberConfig,
};

/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "CHIBI_CONFIG";
/// Environment variable for logging configuration (overrides `log_level`).
pub const LOG_ENV_VAR: &str = "CHIBI_LOG";

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// `${ENV:NAME}` reference inside a string value.
static ENV_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{ENV:([^}]+)\}").expect("env reference pattern is valid"));

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Config file is not valid: {0}")]
    Validation(String),
}

/// Log level names accepted in `log_level`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub event_stores: Vec<EventStoreConfig>,
    pub hooks: HookListConfig,
    pub subscribers: Vec<SubscriberConfig>,
    pub log_level: LogLevel,
    /// Process-wide variables exposed to conditions and actions.
    pub vars: BTreeMap<String, String>,
}

impl Config {
    /// Load and validate configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse, interpolate and validate configuration from YAML text.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let mut value: serde_yaml::Value = serde_yaml::from_str(contents)?;
        interpolate_env(&mut value);
        let config: Config = serde_yaml::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the resolved configuration as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check cross-references and invariants the schema cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for store in &self.event_stores {
            if !names.insert(store.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate event store name '{}'",
                    store.name
                )));
            }
            if store.store_type == EventStoreType::Rabbitmq && store.rabbitmq.is_none() {
                return Err(ConfigError::Validation(format!(
                    "RabbitMQ client config should be provided in the `rabbitmq` key of event store '{}'",
                    store.name
                )));
            }
        }

        for (index, subscriber) in self.subscribers.iter().enumerate() {
            let context = format!("subscribers[{}]", index);
            if !names.contains(subscriber.from.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "{}: event store '{}' is not defined",
                    context, subscriber.from
                )));
            }
            if let Some(debounce) = &subscriber.debounce {
                if parse_debounce(debounce).is_none() {
                    return Err(ConfigError::Validation(format!(
                        "{}: invalid debounce value '{}'",
                        context, debounce
                    )));
                }
            }
            let queue = subscriber.params.queue.as_ref();
            if queue.and_then(|q| q.resolved_name()).is_none() {
                return Err(ConfigError::Validation(format!(
                    "{}: subscribe params must declare a named or exclusive queue",
                    context
                )));
            }
            subscriber
                .params
                .validate()
                .map_err(|e| ConfigError::Validation(format!("{}: {}", context, e)))?;
            validate_actions(&subscriber.actions, &names, &context)?;
        }

        if let Some(startup) = &self.hooks.startup {
            validate_actions(&startup.actions, &names, "hooks.startup")?;
        }
        if let Some(shutdown) = &self.hooks.shutdown {
            validate_actions(&shutdown.actions, &names, "hooks.shutdown")?;
        }

        Ok(())
    }
}

fn validate_actions(
    actions: &[ActionConfig],
    stores: &HashSet<&str>,
    context: &str,
) -> Result<(), ConfigError> {
    for (index, action) in actions.iter().enumerate() {
        if let ActionKind::EventStorePublish(publish) = &action.kind {
            let context = format!("{}.actions[{}]", context, index);
            if !stores.contains(publish.to.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "{}: event store '{}' is not defined",
                    context, publish.to
                )));
            }
            publish
                .params
                .validate()
                .and_then(|_| publish.params.publish_target().map(|_| ()))
                .map_err(|e| ConfigError::Validation(format!("{}: {}", context, e)))?;
        }
    }
    Ok(())
}

/// Replace `${ENV:NAME}` references in every string value.
///
/// Unset variables expand to an empty string. Mapping keys are left alone.
pub fn interpolate_env(value: &mut serde_yaml::Value) {
    match value {
        serde_yaml::Value::String(text) => {
            if ENV_REFERENCE.is_match(text) {
                *text = interpolate_str(text);
            }
        }
        serde_yaml::Value::Sequence(items) => items.iter_mut().for_each(interpolate_env),
        serde_yaml::Value::Mapping(mapping) => {
            mapping.iter_mut().for_each(|(_, v)| interpolate_env(v))
        }
        serde_yaml::Value::Tagged(tagged) => interpolate_env(&mut tagged.value),
        _ => {}
    }
}

fn interpolate_str(text: &str) -> String {
    ENV_REFERENCE
        .replace_all(text, |caps: &Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}
