//! Scalar value and type model
//!
//! This crate holds the runtime value representation shared by the whole
//! pipeline: tagged scalar values, scalar types with an explicit nullability
//! flag, typed literals, and the total cross-type ordering used by the
//! reference interpreter.

mod types;
mod value;

pub use types::{BaseType, ScalarType, TypeError};
pub use value::{CoerceError, Literal, LiteralError, Value};
