pub mod data_source;
pub mod lowering_context;
pub mod lowering_error;
pub mod metadata;
pub mod name_generator;
pub mod resolvers;

pub use data_source::*;
pub use lowering_context::*;
pub use lowering_error::*;
pub use metadata::*;
pub use name_generator::*;
pub use resolvers::*;
