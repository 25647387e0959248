//! Stage implementations backed by external commands.
//!
//! A command stage is spawned through `sh -c` with:
//! - the [`StepInputs`] as JSON on stdin
//! - `DRAWING_PIPELINE_STEP` and `DRAWING_PIPELINE_STEP_NAME` in the environment
//!
//! and must print a [`StepOutcome`] JSON object on stdout.

use super::{StepContract, StepInputs, StepNumber, StepOutcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

/// One `[[stages]]` entry: the command that implements a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub step: StepNumber,

    /// Command line, run through `sh -c`.
    pub command: String,

    /// Working directory. Relative paths resolve against the project directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Defaults to 300 seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    300
}

impl StageDefinition {
    pub fn new(step: StepNumber, command: impl Into<String>) -> Self {
        Self {
            step,
            command: command.into(),
            working_dir: None,
            timeout_secs: default_timeout(),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Runs a [`StageDefinition`] as a subprocess.
pub struct CommandStep {
    definition: StageDefinition,
    working_dir: PathBuf,
}

impl CommandStep {
    pub fn new(definition: StageDefinition, project_dir: impl AsRef<Path>) -> Self {
        let project_dir = project_dir.as_ref();
        let working_dir = match &definition.working_dir {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => project_dir.join(p),
            None => project_dir.to_path_buf(),
        };
        Self {
            definition,
            working_dir,
        }
    }

    fn parse_outcome(&self, output: &std::process::Output) -> StepOutcome {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = stdout.trim();
        let stderr = stderr.trim();

        if !stderr.is_empty() {
            tracing::debug!(step = %self.definition.step, stderr, "Stage command stderr");
        }

        let parsed = (!stdout.is_empty())
            .then(|| serde_json::from_str::<StepOutcome>(stdout))
            .transpose();

        match (output.status.success(), parsed) {
            (_, Ok(Some(outcome))) => outcome,
            (true, Ok(None)) => StepOutcome::failure("Stage command produced no output"),
            (true, Err(e)) => StepOutcome::failure(format!("Stage command produced invalid output: {}", e)),
            (false, _) => {
                let code = output.status.code().unwrap_or(-1);
                if stderr.is_empty() {
                    StepOutcome::failure(format!("Stage command failed with exit code {}", code))
                } else {
                    StepOutcome::failure(format!("Stage command failed (exit {}): {}", code, stderr))
                }
            }
        }
    }
}

#[async_trait]
impl StepContract for CommandStep {
    async fn execute(&self, inputs: StepInputs) -> Result<StepOutcome> {
        let command = &self.definition.command;
        let payload = serde_json::to_string(&inputs).context("Failed to serialize stage inputs to JSON")?;

        tracing::debug!(
            step = %inputs.step,
            command = %command,
            timeout_secs = self.definition.timeout_secs,
            "Spawning stage command"
        );

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("DRAWING_PIPELINE_STEP", inputs.step.to_string())
            .env("DRAWING_PIPELINE_STEP_NAME", &inputs.step_name)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn stage command: {}", command))?;

        let stdin = child.stdin.take();
        let run = async move {
            if let Some(mut stdin) = stdin {
                // A command that never reads stdin closes the pipe early.
                if let Err(e) = stdin.write_all(payload.as_bytes()).await
                    && e.kind() != std::io::ErrorKind::BrokenPipe
                {
                    return Err(e).context("Failed to write inputs to stage stdin");
                }
            }
            child.wait_with_output().await.context("Failed to wait for stage command")
        };

        // The limit covers feeding stdin too; dropping `run` kills the child.
        let limit = Duration::from_secs(self.definition.timeout_secs);
        let output = match timeout(limit, run).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(step = %inputs.step, "Stage command timed out");
                return Ok(StepOutcome::failure(format!(
                    "Stage command timed out after {} seconds",
                    self.definition.timeout_secs
                )));
            }
        };

        Ok(self.parse_outcome(&output))
    }
}
