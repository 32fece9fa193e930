//! Lowering from the query algebra to the neutral SQL tree
//!
//! Each operator node becomes one SELECT over its compiled source.
//! Relationship walks become joins that float until the SELECT owning
//! their root alias closes over them; ordering survives subquery
//! boundaries through helper columns re-applied by each wrapping SELECT.

pub mod compile;
pub mod context;
pub mod error;

pub use compile::{compile, UNBOUNDED_LIMIT};
pub use context::Context;
pub use error::CompileError;
