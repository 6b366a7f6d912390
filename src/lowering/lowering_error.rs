use std::fmt::{self, Display};

use crate::ast::Position;

/// User-correctable structural error, reported with the position of the offending node.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub message: String,
    pub position: Position,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, position: Position) -> Self {
        Self { message: message.into(), position }
    }
}

impl Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyntaxError: {}\n  at [{}]", self.message, self.position)
    }
}

/// Accumulates syntax errors for one compilation; never aborts the pass on its own.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Vec<SyntaxError>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, error: SyntaxError) {
        tracing::debug!(line = error.position.line, column = error.position.column, "{}", error.message);
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[SyntaxError] {
        &self.errors
    }

    pub fn take(&mut self) -> Vec<SyntaxError> {
        std::mem::take(&mut self.errors)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoweringError {
    /// Collected structural errors, surfaced by the checked entry point.
    Syntax(Vec<SyntaxError>),
    /// Query frame stack was empty where a query was being lowered.
    MissingQueryFrame,
    UnresolvedAlias(String),
    /// Output-only node (or other impossible shape) found in the input tree.
    UnexpectedNode(String),
    InvalidConfig(String),
    Io(String),
}

impl LoweringError {
    /// Internal errors point at a defective input tree rather than at the query text.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            LoweringError::MissingQueryFrame | LoweringError::UnresolvedAlias(_) | LoweringError::UnexpectedNode(_)
        )
    }
}

impl Display for LoweringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoweringError::Syntax(errors) => {
                write!(f, "{} syntax error(s)", errors.len())?;
                for e in errors {
                    write!(f, "\n{}", e)?;
                }
                Ok(())
            }
            LoweringError::MissingQueryFrame => write!(f, "internal: no query frame on the lowering stack"),
            LoweringError::UnresolvedAlias(alias) => write!(f, "internal: alias '{}' has no access path", alias),
            LoweringError::UnexpectedNode(node) => write!(f, "internal: unexpected node in input tree: {}", node),
            LoweringError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            LoweringError::Io(msg) => write!(f, "io: {}", msg),
        }
    }
}

impl std::error::Error for LoweringError {}
