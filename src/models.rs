//! Core data models for the Pump pipeline executor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::description::NodeDescription;
use crate::error::{PumpError, Result};

// Input validation limits
pub const MAX_WORKFLOW_SIZE: usize = 1_048_576; // 1 MB
pub const MAX_NODE_COUNT: usize = 1_000;
pub const MAX_NODE_ID_LEN: usize = 64;
pub const MAX_OUTPUT_SIZE: usize = 10_485_760; // 10 MB

/// Suffix of files a node consumes
pub const INPUT_SUFFIX: &str = ".in";
/// Suffix of files a node produces
pub const OUTPUT_SUFFIX: &str = ".out";

/// File name of input port `index` for a node named `base`
pub fn input_file_name(base: &str, index: usize) -> String {
    format!("{}_{}{}", base, index, INPUT_SUFFIX)
}

/// File name of output port `index` for a node named `base`.
///
/// A node with a single output writes `<base>.out`; nodes with several
/// outputs index them like inputs: `<base>_0.out`, `<base>_1.out`, ...
pub fn output_file_name(base: &str, index: usize, arity: usize) -> String {
    if arity == 1 {
        format!("{}{}", base, OUTPUT_SUFFIX)
    } else {
        format!("{}_{}{}", base, index, OUTPUT_SUFFIX)
    }
}

/// Check a node identifier: alphanumeric, underscore and dash, at most 64 characters
pub fn is_valid_identifier(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_NODE_ID_LEN
        && id.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Output,
    Input,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Output => write!(f, "out"),
            Direction::Input => write!(f, "in"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "out" => Ok(Direction::Output),
            "in" => Ok(Direction::Input),
            _ => Err(()),
        }
    }
}

/// Stable handle of a node inside its [`crate::graph::Pump`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeHandle(pub(crate) usize);

impl NodeHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Node execution status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Pending => write!(f, "pending"),
            NodeStatus::Running => write!(f, "running"),
            NodeStatus::Success => write!(f, "success"),
            NodeStatus::Failed => write!(f, "failed"),
            NodeStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// One executable pipeline stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    id: String,
    program: String,
    command: String,
    invocation: Vec<String>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    status: NodeStatus,
}

impl Node {
    /// Build a node from its parsed self-description.
    ///
    /// `program` is the command written in the workflow declaration.
    pub fn from_description(id: &str, program: &str, description: NodeDescription) -> Result<Self> {
        if !is_valid_identifier(id) {
            return Err(PumpError::InvalidIdentifier(id.to_string()));
        }

        let invocation: Vec<String> = description
            .command
            .split_whitespace()
            .map(str::to_string)
            .collect();

        if invocation.is_empty() {
            return Err(PumpError::Description {
                command: program.to_string(),
                reason: "empty command line".to_string(),
            });
        }

        Ok(Self {
            id: id.to_string(),
            program: program.to_string(),
            command: description.name,
            invocation,
            inputs: description.inputs,
            outputs: description.outputs,
            status: NodeStatus::Pending,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Command as declared in the workflow
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Self-reported command name
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Argument vector the driver runs
    pub fn invocation(&self) -> &[String] {
        &self.invocation
    }

    pub fn input_arity(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_arity(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_source(&self) -> bool {
        self.inputs.is_empty()
    }

    /// File consumed at input port `port`
    pub fn input(&self, port: usize) -> Option<&str> {
        self.inputs.get(port).map(String::as_str)
    }

    /// File produced at output port `port`
    pub fn output(&self, port: usize) -> Option<&str> {
        self.outputs.get(port).map(String::as_str)
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: NodeStatus) {
        self.status = status;
    }
}

/// Data channel from an output port to an input port (ports are 0-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub source: NodeHandle,
    pub source_port: usize,
    pub target: NodeHandle,
    pub target_port: usize,
}

/// Result of running one node command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub duration: Duration,
    #[serde(default)]
    pub output_truncated: bool, // True if output exceeded MAX_OUTPUT_SIZE
}

/// Summary of a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Node ids in the order they finished
    pub executed: Vec<String>,
    pub routed_edges: usize,
}
