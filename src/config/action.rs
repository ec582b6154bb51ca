//! Action configuration types.
//!
//! Actions are written as `{type, params, condition}`. The `type` tag selects
//! how `params` is interpreted; unknown tags are rejected while parsing.

use serde::{Deserialize, Serialize};

use crate::event_store::TopologyParams;

/// One guarded step of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawActionConfig", into = "RawActionConfig")]
pub struct ActionConfig {
    pub kind: ActionKind,
    /// Guard expression; the action runs unless it evaluates to `false`.
    pub condition: Option<String>,
}

/// Action variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    /// Run a script through `sh -c`.
    Shell(ShellParams),
    /// Publish a message to another event store.
    EventStorePublish(PublishParams),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellParams {
    pub script: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishParams {
    /// Target event store name.
    pub to: String,
    /// Broker-specific publish parameters.
    pub params: TopologyParams,
}

impl ActionConfig {
    /// Shell action running `script`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Shell(ShellParams {
                script: script.into(),
            }),
            condition: None,
        }
    }

    /// Publish action targeting the event store `to`.
    pub fn publish(to: impl Into<String>, params: TopologyParams) -> Self {
        Self {
            kind: ActionKind::EventStorePublish(PublishParams {
                to: to.into(),
                params,
            }),
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Configured `type` tag.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            ActionKind::Shell(_) => "shell",
            ActionKind::EventStorePublish(_) => "event_store_publish",
        }
    }
}

/// Action type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ActionType {
    Shell,
    EventStorePublish,
}

/// Wire shape of an action before `params` is typed.
#[derive(Serialize, Deserialize)]
struct RawActionConfig {
    #[serde(rename = "type")]
    action_type: ActionType,
    #[serde(default)]
    params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    condition: Option<String>,
}

impl TryFrom<RawActionConfig> for ActionConfig {
    type Error = serde_json::Error;

    fn try_from(raw: RawActionConfig) -> Result<Self, Self::Error> {
        let kind = match raw.action_type {
            ActionType::Shell => ActionKind::Shell(serde_json::from_value(raw.params)?),
            ActionType::EventStorePublish => {
                ActionKind::EventStorePublish(serde_json::from_value(raw.params)?)
            }
        };
        Ok(Self {
            kind,
            condition: raw.condition,
        })
    }
}

impl From<ActionConfig> for RawActionConfig {
    fn from(config: ActionConfig) -> Self {
        let (action_type, params) = match config.kind {
            ActionKind::Shell(params) => (ActionType::Shell, serde_json::to_value(params)),
            ActionKind::EventStorePublish(params) => {
                (ActionType::EventStorePublish, serde_json::to_value(params))
            }
        };
        Self {
            action_type,
            params: params.unwrap_or_default(),
            condition: config.condition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::ExchangeConfig;
    use serde_json::json;

    #[test]
    fn test_parse_shell_action() {
        let yaml = r#"
type: shell
params:
  script: echo "$payload"
condition: payload.json.amount > 100
"#;
        let action: ActionConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            action.kind,
            ActionKind::Shell(ShellParams {
                script: "echo \"$payload\"".to_string()
            })
        );
        assert_eq!(action.condition.as_deref(), Some("payload.json.amount > 100"));
    }

    #[test]
    fn test_parse_publish_action() {
        let yaml = r#"
type: event_store_publish
params:
  to: main
  params:
    exchange:
      name: events
      assert: true
      type: fanout
    payload:
      x: 1
"#;
        let action: ActionConfig = serde_yaml::from_str(yaml).unwrap();
        let ActionKind::EventStorePublish(params) = action.kind else {
            panic!("expected publish action");
        };
        assert_eq!(params.to, "main");
        assert_eq!(
            params.params.exchange,
            Some(ExchangeConfig::new("events", "fanout").with_assert())
        );
        assert_eq!(params.params.payload, Some(json!({"x": 1})));
    }

    #[test]
    fn test_unknown_action_type_is_rejected() {
        let yaml = "type: http\nparams:\n  url: http://localhost\n";
        assert!(serde_yaml::from_str::<ActionConfig>(yaml).is_err());
    }

    #[test]
    fn test_params_must_match_type() {
        let yaml = "type: shell\nparams:\n  to: main\n";
        assert!(serde_yaml::from_str::<ActionConfig>(yaml).is_err());
    }

    #[test]
    fn test_serialize_keeps_wire_shape() {
        let action = ActionConfig::shell("true").with_condition("enabled");
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(
            value,
            json!({"type": "shell", "params": {"script": "true"}, "condition": "enabled"})
        );
    }
}
