//! Shell action: runs a script through `sh -c`.

use std::collections::BTreeMap;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use super::{ActionError, ActionOutput};

/// Absolute path; the child environment carries no `PATH` to resolve against.
const SHELL: &str = "/bin/sh";

/// Runs `script` with an environment made only of the run's bindings.
///
/// The parent environment is not inherited, `PATH` included; scripts that
/// need it must receive it as a configured variable.
#[derive(Debug, Clone)]
pub struct ShellAction {
    script: String,
    env: BTreeMap<String, String>,
}

impl ShellAction {
    pub fn new(script: impl Into<String>, env: BTreeMap<String, String>) -> Self {
        Self {
            script: script.into(),
            env,
        }
    }

    pub async fn execute(&self) -> Result<ActionOutput, ActionError> {
        debug!(script = %self.script, "Running shell action");

        let output = Command::new(SHELL)
            .arg("-c")
            .arg(&self.script)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ActionError::Spawn {
                script: self.script.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ActionError::Exited {
                script: self.script.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        info!(script = %self.script, stdout = %stdout.trim_end(), "Shell action completed");
        Ok(ActionOutput::Stdout(stdout))
    }
}
