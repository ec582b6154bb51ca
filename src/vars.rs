//! Variable bindings exposed to conditions and actions.
//!
//! Bindings are a flat string-keyed map. Values keep their shape so that
//! condition expressions can navigate decoded payloads while process
//! environments receive a string rendering of each value.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Number, Value};

/// Binding holding the host name of the running process.
pub const HOSTNAME_VAR: &str = "__CHIBI_HOSTNAME";
/// Reserved binding carrying the decoded message payload as `{"json": ...}`.
pub const PAYLOAD_VAR: &str = "payload";

/// A single binding value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VarValue {
    String(String),
    Number(Number),
    /// Structured value, e.g. a decoded JSON payload.
    Json(Value),
}

impl VarValue {
    /// Rendering used in process environments.
    ///
    /// Strings are passed through, everything else is JSON-encoded.
    pub fn to_env_string(&self) -> String {
        match self {
            VarValue::String(s) => s.clone(),
            VarValue::Number(n) => n.to_string(),
            VarValue::Json(v) => v.to_string(),
        }
    }
}

impl From<String> for VarValue {
    fn from(value: String) -> Self {
        VarValue::String(value)
    }
}

impl From<&str> for VarValue {
    fn from(value: &str) -> Self {
        VarValue::String(value.to_string())
    }
}

impl From<i64> for VarValue {
    fn from(value: i64) -> Self {
        VarValue::Number(value.into())
    }
}

impl From<f64> for VarValue {
    fn from(value: f64) -> Self {
        Number::from_f64(value)
            .map(VarValue::Number)
            .unwrap_or(VarValue::Json(Value::Null))
    }
}

impl From<Value> for VarValue {
    fn from(value: Value) -> Self {
        VarValue::Json(value)
    }
}

/// Flat binding set, cloned per pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Vars(BTreeMap<String, VarValue>);

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide bindings: the host name plus configured variables.
    ///
    /// Configured variables override the built-in ones.
    pub fn global(configured: &BTreeMap<String, String>) -> Self {
        let mut vars = Self::new();
        vars.insert(HOSTNAME_VAR, hostname());
        for (key, value) in configured {
            vars.insert(key.clone(), value.clone());
        }
        vars
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<VarValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<VarValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&VarValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of these bindings with the decoded payload under [`PAYLOAD_VAR`].
    pub fn with_payload(&self, decoded: Value) -> Self {
        let mut vars = self.clone();
        vars.insert(PAYLOAD_VAR, serde_json::json!({ "json": decoded }));
        vars
    }

    /// Environment for spawned processes.
    pub fn to_env(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(key, value)| (key.clone(), value.to_env_string()))
            .collect()
    }
}

#[cfg(unix)]
fn hostname() -> String {
    nix::unistd::gethostname()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(not(unix))]
fn hostname() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_global_includes_hostname_and_config() {
        let mut configured = BTreeMap::new();
        configured.insert("ENVIRONMENT".to_string(), "prod".to_string());

        let vars = Vars::global(&configured);
        assert!(vars.get(HOSTNAME_VAR).is_some());
        assert_eq!(vars.get("ENVIRONMENT"), Some(&VarValue::from("prod")));
    }

    #[test]
    fn test_configured_vars_override_builtins() {
        let mut configured = BTreeMap::new();
        configured.insert(HOSTNAME_VAR.to_string(), "pinned".to_string());

        let vars = Vars::global(&configured);
        assert_eq!(vars.get(HOSTNAME_VAR), Some(&VarValue::from("pinned")));
    }

    #[test]
    fn test_with_payload_leaves_base_untouched() {
        let base = Vars::new().with("ENVIRONMENT", "prod");
        let vars = base.with_payload(json!({"amount": 150}));

        assert!(base.get(PAYLOAD_VAR).is_none());
        assert_eq!(
            vars.get(PAYLOAD_VAR),
            Some(&VarValue::Json(json!({"json": {"amount": 150}})))
        );
    }

    #[test]
    fn test_env_rendering() {
        let vars = Vars::new()
            .with("NAME", "orders")
            .with("COUNT", 3i64)
            .with("RATIO", 0.5f64)
            .with_payload(json!({"amount": 150}));

        let env = vars.to_env();
        assert_eq!(env["NAME"], "orders");
        assert_eq!(env["COUNT"], "3");
        assert_eq!(env["RATIO"], "0.5");
        assert_eq!(env[PAYLOAD_VAR], r#"{"json":{"amount":150}}"#);
    }

    #[test]
    fn test_serializes_as_flat_map() {
        let vars = Vars::new().with("NAME", "orders").with("COUNT", 3i64);
        assert_eq!(
            serde_json::to_value(&vars).unwrap(),
            json!({"NAME": "orders", "COUNT": 3})
        );
    }
}
