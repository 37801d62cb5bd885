//! Node runners

pub mod process;

use crate::error::Result;
use crate::models::{ExecutionResult, Node, MAX_OUTPUT_SIZE};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Concrete command line for one node run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Node id, for logging
    pub node: String,
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
}

impl Invocation {
    /// Invocation of a node's self-described command line inside `workdir`
    pub fn for_node(node: &Node, workdir: &Path) -> Self {
        let (program, args) = node
            .invocation()
            .split_first()
            .map(|(program, args)| (program.clone(), args.to_vec()))
            .unwrap_or_default();

        Self {
            node: node.id().to_string(),
            program,
            args,
            workdir: workdir.to_path_buf(),
        }
    }
}

/// Seam between the pipeline engine and the processes behind its nodes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeRunner: Send + Sync {
    /// Ask `command` for its self-description and return the raw response
    async fn describe(&self, command: &str) -> Result<String>;

    /// Run one node to completion
    async fn execute(&self, invocation: &Invocation) -> Result<ExecutionResult>;
}

/// Truncate byte output to MAX_OUTPUT_SIZE
///
/// Returns (truncated_string, was_truncated)
pub(crate) fn truncate_output_bytes(data: &[u8]) -> (String, bool) {
    let truncated = data.len() > MAX_OUTPUT_SIZE;
    let bytes = if truncated {
        &data[..MAX_OUTPUT_SIZE]
    } else {
        data
    };

    let output = String::from_utf8_lossy(bytes).to_string();
    (output, truncated)
}
