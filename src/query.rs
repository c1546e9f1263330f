//! Builds the single `SELECT` statements posts are read with.
pub mod builder;
pub mod filters;
pub mod prepare;

pub use builder::{Direction, FieldSpec, JoinMode, QueryBuilder, RenderedQuery};
pub use filters::PostQuery;
pub use prepare::{Prepare, SqlArg, SqlPrepare};
