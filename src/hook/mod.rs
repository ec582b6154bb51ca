//! Startup and shutdown hooks.
//!
//! Hooks run against the process-wide bindings only; there is no payload.
//! A hook condition that fails to evaluate does not skip its action.

use std::sync::Arc;

use tracing::{info, info_span, Instrument};

use crate::condition::ConditionErrorPolicy;
use crate::config::{HookConfig, HookListConfig};
use crate::pipeline::{PipelineError, PipelineReport, PipelineRunner};
use crate::vars::Vars;

/// Errors raised by hook pipelines.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Startup hook failed: {0}")]
    Startup(#[source] PipelineError),

    #[error("Shutdown hook failed: {0}")]
    Shutdown(#[source] PipelineError),
}

/// Runs the configured hook pipelines.
pub struct HookManager {
    hooks: HookListConfig,
    runner: Arc<PipelineRunner>,
    vars: Arc<Vars>,
}

impl HookManager {
    pub fn new(hooks: HookListConfig, runner: Arc<PipelineRunner>, vars: Arc<Vars>) -> Self {
        Self {
            hooks,
            runner,
            vars,
        }
    }

    pub async fn startup(&self) -> Result<PipelineReport, HookError> {
        self.run("startup", self.hooks.startup.as_ref())
            .await
            .map_err(HookError::Startup)
    }

    /// Runs the shutdown list when one is configured; otherwise does nothing.
    pub async fn shutdown(&self) -> Result<PipelineReport, HookError> {
        self.run("shutdown", self.hooks.shutdown.as_ref())
            .await
            .map_err(HookError::Shutdown)
    }

    async fn run(
        &self,
        phase: &'static str,
        hook: Option<&HookConfig>,
    ) -> Result<PipelineReport, PipelineError> {
        let Some(hook) = hook else {
            return Ok(PipelineReport::default());
        };

        let report = self
            .runner
            .run(&hook.actions, &self.vars, ConditionErrorPolicy::Proceed)
            .instrument(info_span!("hook", phase))
            .await?;

        info!(
            phase,
            executed = report.executed,
            skipped = report.skipped,
            "Hook completed"
        );
        Ok(report)
    }
}
