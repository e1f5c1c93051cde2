//! Shell command step.
//!
//! Lets operators plug provider CLIs (`doctl`, `aws`, `gcloud`, ...) in as
//! workflow steps without writing Rust. The command and environment values
//! are templates rendered against [`Config::template_context`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::config::Config;
use crate::error::StepError;
use crate::registry::{OutputSink, Step};
use crate::template::TemplateEngine;

/// Declarative definition of a shell step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellStepSpec {
    /// Step name referenced by workflows.
    pub name: String,

    /// Command template.
    pub command: String,

    /// Shell to use (default: "bash").
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Working directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    /// Environment variables; values are templates.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

fn default_shell() -> String {
    "bash".to_string()
}

/// Step that runs a templated shell command and streams its output.
pub struct ShellStep {
    spec: ShellStepSpec,
    templates: TemplateEngine,
}

impl ShellStep {
    /// Create a shell step from its definition.
    pub fn new(spec: ShellStepSpec) -> Self {
        Self {
            spec,
            templates: TemplateEngine::new(),
        }
    }

    /// Build the child process for `config` without spawning it.
    fn build_command(&self, config: &Config) -> Result<Command, StepError> {
        let context = config.template_context();
        let command = self.templates.render(&self.spec.command, &context)?;

        let mut cmd = Command::new(&self.spec.shell);
        cmd.arg("-c").arg(&command);

        if let Some(dir) = &self.spec.cwd {
            cmd.current_dir(dir);
        }

        for (key, value) in &self.spec.env {
            cmd.env(key, self.templates.render(value, &context)?);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            step = %self.spec.name,
            shell = %self.spec.shell,
            cwd = ?self.spec.cwd,
            "Prepared shell command"
        );

        Ok(cmd)
    }
}

#[async_trait]
impl Step for ShellStep {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn run(&self, config: &Config, out: &mut OutputSink) -> Result<(), StepError> {
        let mut child = self
            .build_command(config)?
            .spawn()
            .map_err(|e| StepError::Process(format!("Failed to spawn process: {}", e)))?;

        // stdout and stderr are interleaved into one sink in arrival order
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx.clone()));
        }
        drop(tx);

        let streamed = async {
            while let Some(line) = rx.recv().await {
                out.write_all(line.as_bytes()).await?;
            }
            out.flush().await?;
            Ok::<(), StepError>(())
        };

        let execution = async {
            let (status, streamed) = tokio::join!(child.wait(), streamed);
            streamed?;
            status.map_err(|e| StepError::Process(format!("Failed to wait for process: {}", e)))
        };

        let status = match self.spec.timeout_seconds {
            Some(secs) => {
                let result = timeout(Duration::from_secs(secs), execution).await;
                match result {
                    Ok(result) => result?,
                    Err(_) => {
                        let _ = child.kill().await;
                        return Err(StepError::Timeout(secs));
                    }
                }
            }
            None => execution.await?,
        };

        if status.success() {
            Ok(())
        } else {
            Err(StepError::ExecutionFailed(format!(
                "command exited with code {}",
                status.code().unwrap_or(-1)
            )))
        }
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: R, tx: mpsc::UnboundedSender<String>) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(format!("{}\n", line)).is_err() {
            break;
        }
    }
}
