pub mod aggregate_resolver;
pub mod alias_path_resolver;
pub mod free_variables;
pub mod group_resolver;
pub mod record_builder;
pub mod scope_resolver;

pub use aggregate_resolver::*;
pub use alias_path_resolver::*;
pub use free_variables::*;
pub use group_resolver::*;
pub use record_builder::*;
pub use scope_resolver::*;
