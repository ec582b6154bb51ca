//! Guard condition evaluation.
//!
//! Conditions are minijinja expressions evaluated against the bindings of
//! one pipeline run, e.g. `payload.json.amount > 100`. An action is skipped
//! only when its condition evaluates to the boolean `false`; any other value
//! lets it run.

use minijinja::value::ValueKind;
use minijinja::{Environment, Value};
use tracing::{debug, warn};

use crate::vars::Vars;

/// Errors raised while evaluating a condition.
#[derive(Debug, thiserror::Error)]
pub enum ConditionError {
    #[error("Invalid condition '{expression}': {source}")]
    Compile {
        expression: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("Condition '{expression}' failed: {source}")]
    Evaluate {
        expression: String,
        #[source]
        source: minijinja::Error,
    },
}

/// What to do with an action whose condition cannot be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionErrorPolicy {
    /// Skip the action. Used by subscriber pipelines.
    Skip,
    /// Run the action anyway. Used by hook pipelines.
    Proceed,
}

/// Evaluates guard expressions.
pub struct ConditionEvaluator {
    env: Environment<'static>,
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
        }
    }

    /// Evaluate `expression` with `vars` as its context.
    pub fn evaluate(&self, expression: &str, vars: &Vars) -> Result<Value, ConditionError> {
        let compiled =
            self.env
                .compile_expression(expression)
                .map_err(|source| ConditionError::Compile {
                    expression: expression.to_string(),
                    source,
                })?;
        compiled
            .eval(vars)
            .map_err(|source| ConditionError::Evaluate {
                expression: expression.to_string(),
                source,
            })
    }

    /// Decide whether an action guarded by `condition` runs.
    pub fn should_execute(
        &self,
        condition: Option<&str>,
        vars: &Vars,
        policy: ConditionErrorPolicy,
    ) -> bool {
        let Some(expression) = condition else {
            return true;
        };

        match self.evaluate(expression, vars) {
            Ok(value) => {
                let skip = value.kind() == ValueKind::Bool && !value.is_true();
                debug!(condition = %expression, result = %value, skip, "Evaluated condition");
                !skip
            }
            Err(e) => {
                let proceed = policy == ConditionErrorPolicy::Proceed;
                warn!(condition = %expression, error = %e, proceed, "Condition evaluation failed");
                proceed
            }
        }
    }
}
