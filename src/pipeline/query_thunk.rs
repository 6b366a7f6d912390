use std::fmt;

use crate::{lowering::MetadataTable, pipeline::Pipeline};

/// Setup statement run inside the thunk before the pipeline is returned.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `name = [aliasNameList: [...], groupNameList: [...], selectNameList: [...]]`
    DeclareMetadata { name: String, table: MetadataTable },
    /// `name = 0`. The runtime must evaluate the select projector exactly once per row,
    /// in order, for the counter to number rows correctly.
    DeclareCounter { name: String },
}

/// A compiled query: `() -> { statements; return pipeline }`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryThunk {
    pub statements: Vec<Statement>,
    pub pipeline: Pipeline,
}

impl QueryThunk {
    pub fn new(statements: Vec<Statement>, pipeline: Pipeline) -> Self {
        Self { statements, pipeline }
    }

    pub fn metadata(&self) -> Option<&MetadataTable> {
        self.statements.iter().find_map(|s| match s {
            Statement::DeclareMetadata { table, .. } => Some(table),
            _ => None,
        })
    }

    pub fn declares_counter(&self) -> bool {
        self.statements.iter().any(|s| matches!(s, Statement::DeclareCounter { .. }))
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::DeclareMetadata { name, table } => write!(f, "{} = {}", name, table),
            Statement::DeclareCounter { name } => write!(f, "{} = 0", name),
        }
    }
}

impl fmt::Display for QueryThunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "() -> {{ ")?;
        for statement in &self.statements {
            write!(f, "{}; ", statement)?;
        }
        write!(f, "return {} }}", self.pipeline)
    }
}
