//! Self-description protocol
//!
//! A node's backing command answers `--description` with a small
//! `key: value` document:
//!
//! ```text
//! name: sum
//! command: ./harness -i2 -csum
//! input: sum_0.in
//! input: sum_1.in
//! output: sum.out
//! ```
//!
//! `name` and `command` appear exactly once, `input` and `output` once per
//! port, in port order.

use crate::error::{PumpError, Result};
use crate::models::{input_file_name, output_file_name};

/// Argument that asks a command for its self-description
pub const DESCRIPTION_FLAG: &str = "--description";

/// Parsed `--description` response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescription {
    pub name: String,
    pub command: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl NodeDescription {
    /// Description of a harness-style command following the file naming convention
    pub fn conventional(name: &str, command: &str, inputs: usize, outputs: usize) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            inputs: (0..inputs).map(|i| input_file_name(name, i)).collect(),
            outputs: (0..outputs)
                .map(|i| output_file_name(name, i, outputs))
                .collect(),
        }
    }

    /// Parse the stdout of `<program> --description`.
    ///
    /// `program` only labels errors.
    pub fn parse(program: &str, text: &str) -> Result<Self> {
        let invalid = |reason: String| PumpError::Description {
            command: program.to_string(),
            reason,
        };

        let mut name = None;
        let mut command = None;
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| invalid(format!("expected 'key: value', got '{}'", line)))?;
            let key = key.trim();
            let value = value.trim();

            if value.is_empty() {
                return Err(invalid(format!("empty value for '{}'", key)));
            }

            match key {
                "name" => {
                    if name.replace(value.to_string()).is_some() {
                        return Err(invalid("'name' given more than once".to_string()));
                    }
                }
                "command" => {
                    if command.replace(value.to_string()).is_some() {
                        return Err(invalid("'command' given more than once".to_string()));
                    }
                }
                "input" => inputs.push(value.to_string()),
                "output" => outputs.push(value.to_string()),
                other => return Err(invalid(format!("unknown key '{}'", other))),
            }
        }

        Ok(Self {
            name: name.ok_or_else(|| invalid("missing 'name'".to_string()))?,
            command: command.ok_or_else(|| invalid("missing 'command'".to_string()))?,
            inputs,
            outputs,
        })
    }

    /// Render in the wire format accepted by [`NodeDescription::parse`]
    pub fn render(&self) -> String {
        let mut out = format!("name: {}\ncommand: {}\n", self.name, self.command);
        for input in &self.inputs {
            out.push_str(&format!("input: {}\n", input));
        }
        for output in &self.outputs {
            out.push_str(&format!("output: {}\n", output));
        }
        out
    }
}
