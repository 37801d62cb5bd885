//! Workflow text grammar
//!
//! The workflow description is line oriented:
//!
//! ```text
//! # comment
//! a: ./gen
//! b: ./sum
//! a.out.0 -> b.in.0
//! ```
//!
//! Node declarations are `<identifier>: <command>`, edge declarations are
//! `<port> -> <port>`. Blank lines and comments are ignored. Other lines are
//! reported and skipped, while lines that start a declaration but break its
//! grammar are errors.

use crate::error::{PumpError, Result};
use crate::models::{is_valid_identifier, MAX_NODE_COUNT, MAX_WORKFLOW_SIZE};
use crate::port::{resolve_edge, EdgeDeclaration};
use tracing::{debug, warn};

const ARROW: &str = "->";

/// Node declaration `<id>: <command>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDeclaration {
    pub line: usize,
    pub id: String,
    pub command: String,
}

/// One meaningful line of a workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    Node(NodeDeclaration),
    Edge { line: usize, edge: EdgeDeclaration },
}

/// Classification of a single line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Blank,
    Comment,
    Declaration(Declaration),
    Unrecognized,
}

/// Parse a whole workflow text into its declarations, in file order.
///
/// # Errors
///
/// * `PumpError::WorkflowTooLarge` - If the text exceeds 1MB
/// * `PumpError::MalformedDeclaration` - If a declaration breaks its grammar
/// * `PumpError::NodeCountExceeded` - If more than 1,000 nodes are declared
pub fn parse_workflow(content: &str) -> Result<Vec<Declaration>> {
    if content.len() > MAX_WORKFLOW_SIZE {
        return Err(PumpError::WorkflowTooLarge {
            size: content.len(),
            limit: MAX_WORKFLOW_SIZE,
        });
    }

    let mut declarations = Vec::new();
    let mut node_count = 0;

    for (index, text) in content.lines().enumerate() {
        let line_no = index + 1;
        match parse_line(line_no, text)? {
            Line::Blank | Line::Comment => {}
            Line::Unrecognized => {
                warn!("Skipping unrecognized line {}: {}", line_no, text);
            }
            Line::Declaration(declaration) => {
                if matches!(declaration, Declaration::Node(_)) {
                    node_count += 1;
                    if node_count > MAX_NODE_COUNT {
                        return Err(PumpError::NodeCountExceeded {
                            count: node_count,
                            limit: MAX_NODE_COUNT,
                        });
                    }
                }
                declarations.push(declaration);
            }
        }
    }

    debug!("Parsed {} declarations", declarations.len());
    Ok(declarations)
}

/// Classify one line (`line_no` is 1-based and only used in errors)
pub fn parse_line(line_no: usize, text: &str) -> Result<Line> {
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return Ok(Line::Blank);
    }
    if trimmed.starts_with('#') {
        return Ok(Line::Comment);
    }

    // Node grammar first: commands may contain arrows
    if let Some((id, _)) = trimmed.split_once(':') {
        if is_identifier_token(id) {
            if !is_valid_identifier(id) {
                return Err(PumpError::InvalidIdentifier(id.to_string()));
            }
            return parse_node(line_no, trimmed, id).map(Line::Declaration);
        }
    }

    if trimmed.contains(ARROW) {
        return parse_edge(line_no, trimmed).map(Line::Declaration);
    }

    Ok(Line::Unrecognized)
}

/// Identifier characters only, length not checked
fn is_identifier_token(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

fn parse_edge(line_no: usize, trimmed: &str) -> Result<Declaration> {
    let malformed = || PumpError::MalformedDeclaration {
        line: line_no,
        kind: "edge",
        text: trimmed.to_string(),
    };

    let (source, target) = trimmed.split_once(ARROW).ok_or_else(malformed)?;
    let source = source.trim();
    let target = target.trim();

    let single_token = |s: &str| !s.is_empty() && !s.contains(char::is_whitespace);
    if !single_token(source) || !single_token(target) || target.contains(ARROW) {
        return Err(malformed());
    }

    Ok(Declaration::Edge {
        line: line_no,
        edge: resolve_edge(source, target),
    })
}

fn parse_node(line_no: usize, trimmed: &str, id: &str) -> Result<Declaration> {
    // `id:` must be followed by whitespace and a command
    let rest = &trimmed[id.len() + 1..];
    let command = rest.trim();

    if command.is_empty() || !rest.starts_with(char::is_whitespace) {
        return Err(PumpError::MalformedDeclaration {
            line: line_no,
            kind: "node",
            text: trimmed.to_string(),
        });
    }

    Ok(Declaration::Node(NodeDeclaration {
        line: line_no,
        id: id.to_string(),
        command: command.to_string(),
    }))
}
