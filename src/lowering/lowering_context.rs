use crate::{
    config::LoweringConfig,
    lowering::{ErrorCollector, LoweringError, MetadataTable, NameGenerator, SyntaxError},
};

/// State of the query currently being lowered; nested queries get their own frame.
#[derive(Debug, Default)]
pub struct QueryFrame {
    pub metadata: MetadataTable,
    /// Set while the `select` projection is rewritten.
    pub select_mode: bool,
    pub row_number_used: bool,
}

/// Everything one top-level compilation shares across its nested queries.
#[derive(Debug)]
pub struct LoweringContext {
    pub config: LoweringConfig,
    pub errors: ErrorCollector,
    pub names: NameGenerator,
    frames: Vec<QueryFrame>,
}

impl LoweringContext {
    pub fn new(config: LoweringConfig) -> Self {
        let names = NameGenerator::new(config.synthetic_prefix.clone());
        Self { config, errors: ErrorCollector::new(), names, frames: Vec::new() }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push_frame(&mut self) {
        self.frames.push(QueryFrame::default());
        tracing::debug!(depth = self.frames.len(), "entering query");
    }

    pub fn pop_frame(&mut self) -> Result<QueryFrame, LoweringError> {
        let frame = self.frames.pop().ok_or(LoweringError::MissingQueryFrame)?;
        tracing::debug!(depth = self.frames.len(), "leaving query");
        Ok(frame)
    }

    pub fn frame(&self) -> Result<&QueryFrame, LoweringError> {
        self.frames.last().ok_or(LoweringError::MissingQueryFrame)
    }

    pub fn frame_mut(&mut self) -> Result<&mut QueryFrame, LoweringError> {
        self.frames.last_mut().ok_or(LoweringError::MissingQueryFrame)
    }

    pub fn report(&mut self, error: SyntaxError) {
        self.errors.add(error);
    }
}
