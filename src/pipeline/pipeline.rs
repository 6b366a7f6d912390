use std::fmt;

use crate::ast::{Expr, JoinKind, Lambda};

/// One key of an `orderBy` stage.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    pub key: Lambda,
    pub ascending: bool,
}

/// Lowered call chain against the runtime queryable. Each stage wraps its `input`,
/// so the outermost variant is the last call of the chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Pipeline {
    /// `from(source)`
    From { source: Expr },

    /// `<kind>Join(joined, on)`; a cross join carries no predicate.
    Join {
        input: Box<Pipeline>,
        kind: JoinKind,
        joined: Box<Pipeline>,
        on: Option<Lambda>,
    },

    Where { input: Box<Pipeline>, predicate: Lambda },

    GroupBy {
        input: Box<Pipeline>,
        classifier: Lambda,
        having: Option<Lambda>,
    },

    OrderBy { input: Box<Pipeline>, specs: Vec<OrderSpec> },

    Limit { input: Box<Pipeline>, offset: Expr, size: Expr },

    Select { input: Box<Pipeline>, projector: Lambda },
}

/// Mutable view of one expression-bearing argument of a stage.
pub enum PipelineSlot<'a> {
    Value(&'a mut Expr),
    Lambda(&'a mut Lambda),
}

impl Pipeline {
    pub fn call_name(&self) -> &'static str {
        match self {
            Pipeline::From { .. } => "from",
            Pipeline::Join { kind, .. } => kind.call_name(),
            Pipeline::Where { .. } => "where",
            Pipeline::GroupBy { .. } => "groupBy",
            Pipeline::OrderBy { .. } => "orderBy",
            Pipeline::Limit { .. } => "limit",
            Pipeline::Select { .. } => "select",
        }
    }

    /// Number of arguments the stage call passes to the runtime.
    pub fn arity(&self) -> usize {
        match self {
            Pipeline::From { .. } | Pipeline::Where { .. } | Pipeline::Select { .. } => 1,
            Pipeline::Join { on, .. } => 1 + usize::from(on.is_some()),
            Pipeline::GroupBy { having, .. } => 1 + usize::from(having.is_some()),
            Pipeline::OrderBy { specs, .. } => specs.len(),
            Pipeline::Limit { .. } => 2,
        }
    }

    pub fn input(&self) -> Option<&Pipeline> {
        match self {
            Pipeline::From { .. } => None,
            Pipeline::Join { input, .. }
            | Pipeline::Where { input, .. }
            | Pipeline::GroupBy { input, .. }
            | Pipeline::OrderBy { input, .. }
            | Pipeline::Limit { input, .. }
            | Pipeline::Select { input, .. } => Some(input),
        }
    }

    /// Stages in call order, `from` first.
    pub fn stages(&self) -> Vec<&Pipeline> {
        let mut stages = match self.input() {
            Some(input) => input.stages(),
            None => Vec::new(),
        };
        stages.push(self);
        stages
    }

    /// Every expression and lambda reachable from this chain, joined sub-chains included.
    pub fn slots_mut(&mut self) -> Vec<PipelineSlot<'_>> {
        match self {
            Pipeline::From { source } => vec![PipelineSlot::Value(source)],
            Pipeline::Join { input, joined, on, .. } => {
                let mut slots = input.slots_mut();
                slots.extend(joined.slots_mut());
                slots.extend(on.as_mut().map(PipelineSlot::Lambda));
                slots
            }
            Pipeline::Where { input, predicate } => {
                let mut slots = input.slots_mut();
                slots.push(PipelineSlot::Lambda(predicate));
                slots
            }
            Pipeline::GroupBy { input, classifier, having } => {
                let mut slots = input.slots_mut();
                slots.push(PipelineSlot::Lambda(classifier));
                slots.extend(having.as_mut().map(PipelineSlot::Lambda));
                slots
            }
            Pipeline::OrderBy { input, specs } => {
                let mut slots = input.slots_mut();
                slots.extend(specs.iter_mut().map(|spec| PipelineSlot::Lambda(&mut spec.key)));
                slots
            }
            Pipeline::Limit { input, offset, size } => {
                let mut slots = input.slots_mut();
                slots.push(PipelineSlot::Value(offset));
                slots.push(PipelineSlot::Value(size));
                slots
            }
            Pipeline::Select { input, projector } => {
                let mut slots = input.slots_mut();
                slots.push(PipelineSlot::Lambda(projector));
                slots
            }
        }
    }
}

impl fmt::Display for OrderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Order({}, {})", self.key, self.ascending)
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(input) = self.input() {
            write!(f, "{}.", input)?;
        }
        write!(f, "{}(", self.call_name())?;
        match self {
            Pipeline::From { source } => write!(f, "{}", source)?,
            Pipeline::Join { joined, on, .. } => {
                write!(f, "{}", joined)?;
                if let Some(on) = on {
                    write!(f, ", {}", on)?;
                }
            }
            Pipeline::Where { predicate, .. } => write!(f, "{}", predicate)?,
            Pipeline::GroupBy { classifier, having, .. } => {
                write!(f, "{}", classifier)?;
                if let Some(having) = having {
                    write!(f, ", {}", having)?;
                }
            }
            Pipeline::OrderBy { specs, .. } => {
                for (i, spec) in specs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", spec)?;
                }
            }
            Pipeline::Limit { offset, size, .. } => write!(f, "{}, {}", offset, size)?,
            Pipeline::Select { projector, .. } => write!(f, "{}", projector)?,
        }
        write!(f, ")")
    }
}
