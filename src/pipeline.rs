//! Sequential execution of guarded actions.
//!
//! One run evaluates every action against a single snapshot of the bindings:
//! an action's side effects are never visible to later guards or
//! environments in the same run.

use tracing::{debug, error};

use crate::action::{ActionError, ActionFactory};
use crate::condition::{ConditionErrorPolicy, ConditionEvaluator};
use crate::config::ActionConfig;
use crate::vars::Vars;

/// Errors that abort a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Action {index} ({kind}) failed: {source}")]
    Action {
        index: usize,
        kind: &'static str,
        #[source]
        source: ActionError,
    },
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub executed: usize,
    pub skipped: usize,
}

/// Runs action lists.
pub struct PipelineRunner {
    factory: ActionFactory,
    conditions: ConditionEvaluator,
}

impl PipelineRunner {
    pub fn new(factory: ActionFactory) -> Self {
        Self {
            factory,
            conditions: ConditionEvaluator::new(),
        }
    }

    /// Run `actions` in order. The first failing action aborts the run.
    pub async fn run(
        &self,
        actions: &[ActionConfig],
        vars: &Vars,
        policy: ConditionErrorPolicy,
    ) -> Result<PipelineReport, PipelineError> {
        let mut report = PipelineReport::default();

        for (index, config) in actions.iter().enumerate() {
            let kind = config.type_name();
            let fail = |source| PipelineError::Action {
                index,
                kind,
                source,
            };

            let action = self.factory.create(config, vars).map_err(fail)?;

            if !self
                .conditions
                .should_execute(config.condition.as_deref(), vars, policy)
            {
                debug!(index, kind, "Skipping action");
                report.skipped += 1;
                continue;
            }

            if let Err(e) = action.execute().await {
                error!(index, kind, error = %e, "Action failed, aborting pipeline");
                return Err(fail(e));
            }
            report.executed += 1;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::EventStoreConfig;
    use crate::event_store::mock::MockEventStoreClient;
    use crate::event_store::{EventStoreManager, QueueConfig, TopologyParams};
    use serde_json::json;

    fn runner_with(client: Arc<MockEventStoreClient>) -> PipelineRunner {
        let stores = EventStoreManager::new().with_store(EventStoreConfig::noop("main"), client);
        PipelineRunner::new(ActionFactory::new(Arc::new(stores)))
    }

    fn publish(tag: &str) -> ActionConfig {
        ActionConfig::publish(
            "main",
            TopologyParams::default()
                .with_queue(QueueConfig::named("audit"))
                .with_payload(json!(tag)),
        )
    }

    fn published_tags(params: Vec<TopologyParams>) -> Vec<String> {
        params
            .into_iter()
            .filter_map(|p| p.payload.and_then(|v| v.as_str().map(str::to_string)))
            .collect()
    }

    #[tokio::test]
    async fn test_runs_actions_in_order_and_skips_false_guards() {
        let client = Arc::new(MockEventStoreClient::new());
        let runner = runner_with(client.clone());
        let vars = Vars::new().with_payload(json!({"amount": 50}));

        let actions = vec![
            publish("first"),
            publish("guarded").with_condition("payload.json.amount > 100"),
            publish("last"),
        ];
        let report = runner
            .run(&actions, &vars, ConditionErrorPolicy::Skip)
            .await
            .unwrap();

        assert_eq!(
            report,
            PipelineReport {
                executed: 2,
                skipped: 1
            }
        );
        assert_eq!(published_tags(client.published().await), vec!["first", "last"]);
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_actions() {
        let client = Arc::new(MockEventStoreClient::new());
        let runner = runner_with(client.clone());

        let actions = vec![
            ActionConfig::shell("exit 1"),
            publish("never"),
        ];
        let err = runner
            .run(&actions, &Vars::new(), ConditionErrorPolicy::Skip)
            .await
            .unwrap_err();

        let PipelineError::Action { index, kind, .. } = err;
        assert_eq!(index, 0);
        assert_eq!(kind, "shell");
        assert!(client.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_store_aborts_run() {
        let client = Arc::new(MockEventStoreClient::new());
        let runner = runner_with(client);

        let actions = vec![ActionConfig::publish("elsewhere", TopologyParams::default())];
        let err = runner
            .run(&actions, &Vars::new(), ConditionErrorPolicy::Skip)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Action {
                source: ActionError::UnknownEventStore(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_bindings_are_a_snapshot() {
        let client = Arc::new(MockEventStoreClient::new());
        let runner = runner_with(client.clone());
        let vars = Vars::new().with("STAGE", "initial");

        // The first action cannot change what later actions observe.
        let actions = vec![
            ActionConfig::shell("STAGE=changed; export STAGE"),
            publish("seen").with_condition("STAGE == 'initial'"),
        ];
        runner
            .run(&actions, &vars, ConditionErrorPolicy::Skip)
            .await
            .unwrap();

        assert_eq!(published_tags(client.published().await), vec!["seen"]);
        assert_eq!(vars.get("STAGE"), Some(&"initial".into()));
    }

    #[tokio::test]
    async fn test_condition_error_policy() {
        let client = Arc::new(MockEventStoreClient::new());
        let runner = runner_with(client.clone());
        let actions = vec![publish("broken").with_condition("amount >")];

        let skipped = runner
            .run(&actions, &Vars::new(), ConditionErrorPolicy::Skip)
            .await
            .unwrap();
        assert_eq!(skipped.skipped, 1);
        assert!(client.published().await.is_empty());

        let proceeded = runner
            .run(&actions, &Vars::new(), ConditionErrorPolicy::Proceed)
            .await
            .unwrap();
        assert_eq!(proceeded.executed, 1);
        assert_eq!(published_tags(client.published().await), vec!["broken"]);
    }
}
