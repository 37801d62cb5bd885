//! Port descriptor resolution
//!
//! A port descriptor addresses one port of one node as
//! `<identifier>.<out|in>.<index>`, with 0-based indices.

use crate::error::{PumpError, Result};
use crate::models::{is_valid_identifier, Direction};

/// Parsed `<identifier>.<direction>.<index>` triple
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortDescriptor {
    pub node: String,
    pub direction: Direction,
    pub index: usize,
}

impl PortDescriptor {
    /// Parse a descriptor; `None` marks it unresolved.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split('.');
        let node = parts.next()?;
        let direction = parts.next()?.parse::<Direction>().ok()?;
        let index = parts.next()?;

        if parts.next().is_some() || !is_valid_identifier(node) {
            return None;
        }
        // Rejects signs, which usize::from_str would accept
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        Some(Self {
            node: node.to_string(),
            direction,
            index: index.parse().ok()?,
        })
    }

    pub fn is_input(&self) -> bool {
        self.direction == Direction::Input
    }
}

impl std::fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.node, self.direction, self.index)
    }
}

/// Edge declaration with each side resolved independently
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeDeclaration {
    pub source_text: String,
    pub target_text: String,
    pub source: Option<PortDescriptor>,
    pub target: Option<PortDescriptor>,
}

impl EdgeDeclaration {
    /// Both endpoints, provided they resolved and point from an output to an input
    pub fn endpoints(&self) -> Result<(&PortDescriptor, &PortDescriptor)> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| PumpError::UnresolvedPort(self.source_text.clone()))?;
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| PumpError::UnresolvedPort(self.target_text.clone()))?;

        if source.is_input() {
            return Err(self.invalid("source must be an output port"));
        }
        if !target.is_input() {
            return Err(self.invalid("target must be an input port"));
        }

        Ok((source, target))
    }

    fn invalid(&self, reason: &str) -> PumpError {
        PumpError::InvalidEdge {
            from: self.source_text.clone(),
            to: self.target_text.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Resolve the two sides of `<source> -> <target>`
pub fn resolve_edge(source: &str, target: &str) -> EdgeDeclaration {
    EdgeDeclaration {
        source_text: source.to_string(),
        target_text: target.to_string(),
        source: PortDescriptor::parse(source),
        target: PortDescriptor::parse(target),
    }
}
