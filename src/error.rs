//! Error types for Pump

use std::path::PathBuf;
use thiserror::Error;

use crate::models::Direction;

/// Pump error types
#[derive(Error, Debug)]
pub enum PumpError {
    /// Workflow file could not be opened or read
    #[error("Unable to read workflow file '{}': {source}", .path.display())]
    WorkflowUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Workflow text exceeded limit
    #[error("Workflow exceeds {limit} bytes (size: {size} bytes)")]
    WorkflowTooLarge { size: usize, limit: usize },

    /// Node count exceeded limit
    #[error("Node count {count} exceeds limit of {limit}")]
    NodeCountExceeded { count: usize, limit: usize },

    /// Invalid node identifier
    #[error("Invalid node identifier '{0}': only alphanumeric, underscore, and dash allowed (max 64 characters)")]
    InvalidIdentifier(String),

    /// A line looks like a declaration but does not follow its grammar
    #[error("Line {line}: malformed {kind} declaration '{text}'")]
    MalformedDeclaration {
        line: usize,
        kind: &'static str,
        text: String,
    },

    /// Port descriptor did not resolve
    #[error("Unresolved port descriptor '{0}'")]
    UnresolvedPort(String),

    /// Edge endpoints resolved but point the wrong way
    #[error("Invalid edge '{from}' -> '{to}': {reason}")]
    InvalidEdge {
        from: String,
        to: String,
        reason: String,
    },

    /// Two nodes share an identifier
    #[error("Duplicate node identifier '{0}'")]
    DuplicateNode(String),

    /// Edge refers to a node that was never declared
    #[error("Unknown node '{0}'")]
    UnknownNode(String),

    /// Port index beyond the node's declared arity
    #[error("Port {port} of node '{node}' is out of range ({direction} arity {arity})")]
    PortOutOfRange {
        node: String,
        direction: Direction,
        port: usize,
        arity: usize,
    },

    /// Two edges feed the same input port
    #[error("Input port {port} of node '{node}' is already connected")]
    PortAlreadyConnected { node: String, port: usize },

    /// Self-description query failed or returned garbage
    #[error("Invalid self-description from '{command}': {reason}")]
    Description { command: String, reason: String },

    /// DAG errors
    #[error("Cycle detected in workflow: {0}")]
    CycleDetected(String),

    /// Nodes whose inputs are never all satisfied
    #[error("Unreachable nodes (inputs never satisfied): {}", .0.join(", "))]
    UnreachableNodes(Vec<String>),

    /// Node command exited unsuccessfully
    #[error("Node '{node}' failed with exit code {exit_code:?}")]
    NodeFailed {
        node: String,
        exit_code: Option<i32>,
    },

    /// Command execution timeout
    #[error("Command '{command}' timed out after {timeout} seconds")]
    CommandTimeout { command: String, timeout: u64 },

    /// Command string could not be turned into an invocation
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// A spawned node task panicked or was cancelled
    #[error("Node task aborted: {0}")]
    TaskAborted(String),

    /// Routing found no file where a node should have produced one
    #[error("Output '{}' of node '{node}' does not exist", .path.display())]
    MissingOutput { node: String, path: PathBuf },

    /// Moving or copying a routed file failed
    #[error("Failed to route '{}' to '{}': {source}", .from.display(), .to.display())]
    Routing {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration source errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration value errors
    #[error("Invalid configuration: {0}")]
    Validation(String),

    /// Operation that is deliberately not implemented
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of [`PumpError`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Load,
    Scheduling,
    Execution,
    Config,
    Unsupported,
}

impl PumpError {
    /// Which phase the error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            PumpError::WorkflowUnreadable { .. }
            | PumpError::WorkflowTooLarge { .. }
            | PumpError::NodeCountExceeded { .. }
            | PumpError::InvalidIdentifier(_)
            | PumpError::MalformedDeclaration { .. }
            | PumpError::UnresolvedPort(_)
            | PumpError::InvalidEdge { .. }
            | PumpError::DuplicateNode(_)
            | PumpError::UnknownNode(_)
            | PumpError::PortOutOfRange { .. }
            | PumpError::PortAlreadyConnected { .. }
            | PumpError::Description { .. } => ErrorKind::Load,
            PumpError::CycleDetected(_) | PumpError::UnreachableNodes(_) => ErrorKind::Scheduling,
            PumpError::NodeFailed { .. }
            | PumpError::CommandTimeout { .. }
            | PumpError::InvalidCommand(_)
            | PumpError::TaskAborted(_)
            | PumpError::MissingOutput { .. }
            | PumpError::Routing { .. }
            | PumpError::Io(_) => ErrorKind::Execution,
            PumpError::Config(_) | PumpError::Validation(_) => ErrorKind::Config,
            PumpError::Unsupported(_) => ErrorKind::Unsupported,
        }
    }
}

/// Result type alias using PumpError
pub type Result<T> = std::result::Result<T, PumpError>;
