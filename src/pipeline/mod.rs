pub mod pipeline;
pub mod pipeline_builder;
pub mod query_thunk;

#[cfg(test)]
mod _tests;

pub use pipeline::*;
pub use pipeline_builder::*;
pub use query_thunk::*;
