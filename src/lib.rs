pub mod ast;
pub use ast::{Expr, ExprKind, JoinKind, OrderTerm, Position, QueryAst};

pub mod config;
pub use config::LoweringConfig;

pub mod lowering;
pub use lowering::{LoweringContext, LoweringError, SyntaxError};

pub mod pipeline;
pub use pipeline::{Pipeline, PipelineBuilder, QueryThunk, Statement};

/// Lowers `query` with a fresh context, failing if any syntax error was collected.
/// Use [`PipelineBuilder::lower`] to inspect partial output alongside the errors.
pub fn lower(query: &QueryAst, config: &LoweringConfig) -> Result<QueryThunk, LoweringError> {
    PipelineBuilder::lower_checked(query, config)
}
