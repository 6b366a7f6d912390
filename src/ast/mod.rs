pub mod position;
pub use position::*;

pub mod literal;
pub use literal::*;

pub mod operators;
pub use operators::*;

pub mod expr;
pub use expr::*;

pub mod query;
pub use query::*;
