//! Executable actions.
//!
//! `ActionFactory` turns an `ActionConfig` plus the bindings of one run into
//! a ready-to-execute `Action`. Unknown action types never reach this point;
//! they are rejected when the configuration is parsed.

use std::process::ExitStatus;
use std::sync::Arc;

use crate::config::{ActionConfig, ActionKind};
use crate::event_store::{ClientError, EventStoreManager};
use crate::vars::Vars;

mod publish;
mod shell;

pub use publish::PublishAction;
pub use shell::ShellAction;

/// Errors raised while building or executing an action.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Unknown event store: {0}")]
    UnknownEventStore(String),

    #[error("Failed to spawn '{script}': {source}")]
    Spawn {
        script: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{script}' exited with {status}: {stderr}")]
    Exited {
        script: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Publish to '{to}' failed: {source}")]
    Client {
        to: String,
        #[source]
        source: ClientError,
    },
}

/// Result of a successful action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutput {
    /// Captured standard output of a shell action.
    Stdout(String),
    /// Message handed to the named event store.
    Published { to: String },
}

/// A constructed action, bound to the variables of one run.
pub enum Action {
    Shell(ShellAction),
    Publish(PublishAction),
}

impl Action {
    pub async fn execute(&self) -> Result<ActionOutput, ActionError> {
        match self {
            Action::Shell(action) => action.execute().await,
            Action::Publish(action) => action.execute().await,
        }
    }
}

/// Builds actions from configuration.
#[derive(Clone)]
pub struct ActionFactory {
    stores: Arc<EventStoreManager>,
}

impl ActionFactory {
    pub fn new(stores: Arc<EventStoreManager>) -> Self {
        Self { stores }
    }

    pub fn create(&self, config: &ActionConfig, vars: &Vars) -> Result<Action, ActionError> {
        match &config.kind {
            ActionKind::Shell(params) => Ok(Action::Shell(ShellAction::new(
                params.script.clone(),
                vars.to_env(),
            ))),
            ActionKind::EventStorePublish(params) => {
                let store = self
                    .stores
                    .get_client(&params.to)
                    .ok_or_else(|| ActionError::UnknownEventStore(params.to.clone()))?;
                Ok(Action::Publish(PublishAction::new(
                    params.to.clone(),
                    store.client.clone(),
                    params.params.clone(),
                )))
            }
        }
    }
}
