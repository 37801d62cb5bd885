//! Subprocess runner

use crate::description::DESCRIPTION_FLAG;
use crate::error::{PumpError, Result};
use crate::executors::{truncate_output_bytes, Invocation, NodeRunner};
use crate::models::{ExecutionResult, NodeStatus, MAX_OUTPUT_SIZE};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info};

/// Runs node commands as local processes (no shell interpolation)
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    workdir: PathBuf,
    description_timeout: Duration,
    node_timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            description_timeout: Duration::from_secs(30),
            node_timeout: None,
        }
    }

    pub fn with_description_timeout(mut self, timeout: Duration) -> Self {
        self.description_timeout = timeout;
        self
    }

    pub fn with_node_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.node_timeout = timeout;
        self
    }

    async fn run(
        &self,
        mut cmd: Command,
        label: &str,
        timeout: Option<Duration>,
    ) -> Result<Output> {
        // Capture output
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.stdin(std::process::Stdio::null());

        // Ensure child process is killed when the future is dropped (e.g. on timeout).
        cmd.kill_on_drop(true);

        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| {
                    error!("Command '{}' timed out after {} seconds", label, limit.as_secs());
                    PumpError::CommandTimeout {
                        command: label.to_string(),
                        timeout: limit.as_secs(),
                    }
                })?,
            None => cmd.output().await,
        };

        output.map_err(|e| {
            error!("Command '{}' could not be started: {}", label, e);
            PumpError::Io(e)
        })
    }
}

#[async_trait]
impl NodeRunner for ProcessRunner {
    async fn describe(&self, command: &str) -> Result<String> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| PumpError::InvalidCommand("empty command".to_string()))?;

        debug!("Querying self-description of '{}'", command);

        let mut cmd = Command::new(program);
        cmd.args(parts).arg(DESCRIPTION_FLAG);
        cmd.current_dir(&self.workdir);

        let output = self
            .run(cmd, command, Some(self.description_timeout))
            .await
            .map_err(|e| match e {
                PumpError::Io(io) => PumpError::Description {
                    command: command.to_string(),
                    reason: format!("could not be started: {}", io),
                },
                other => other,
            })?;

        if !output.status.success() {
            let (stderr, _) = truncate_output_bytes(&output.stderr);
            return Err(PumpError::Description {
                command: command.to_string(),
                reason: format!(
                    "exited with code {:?}: {}",
                    output.status.code(),
                    stderr.trim()
                ),
            });
        }

        let (stdout, truncated) = truncate_output_bytes(&output.stdout);
        if truncated {
            return Err(PumpError::Description {
                command: command.to_string(),
                reason: format!("response exceeds {} bytes", MAX_OUTPUT_SIZE),
            });
        }

        Ok(stdout)
    }

    async fn execute(&self, invocation: &Invocation) -> Result<ExecutionResult> {
        if invocation.program.is_empty() {
            return Err(PumpError::InvalidCommand(format!(
                "node '{}' has no command line",
                invocation.node
            )));
        }

        info!(
            "Executing node '{}': {} {}",
            invocation.node,
            invocation.program,
            invocation.args.join(" ")
        );

        let start = std::time::Instant::now();

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        cmd.current_dir(&invocation.workdir);

        let output = self
            .run(cmd, &invocation.program, self.node_timeout)
            .await?;
        let duration = start.elapsed();

        let (stdout, stdout_truncated) = truncate_output_bytes(&output.stdout);
        let (stderr, stderr_truncated) = truncate_output_bytes(&output.stderr);
        let output_truncated = stdout_truncated || stderr_truncated;

        if output_truncated {
            debug!("Output truncated to {} bytes", MAX_OUTPUT_SIZE);
        }

        let status = if output.status.success() {
            NodeStatus::Success
        } else {
            NodeStatus::Failed
        };

        info!(
            "Node '{}' completed with status: {} (exit code: {:?})",
            invocation.node,
            status,
            output.status.code()
        );

        Ok(ExecutionResult {
            status,
            stdout: Some(stdout),
            stderr: Some(stderr),
            exit_code: output.status.code(),
            duration,
            output_truncated,
        })
    }
}
