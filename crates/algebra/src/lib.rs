//! Query algebra
//!
//! The strongly-typed, immutable query model the rest of the pipeline
//! consumes: table schemas with forward/back relationships, the expression
//! tree with static type inference, scalar/object projections, and the
//! fluent query builder. Everything here is pure data; compilation and
//! interpretation live in their own crates.

pub mod expr;
pub mod handle;
pub mod names;
pub mod projection;
pub mod query;
pub mod schema;

pub use expr::{
    abs, case, coalesce, concat, length, lower, upper, BinaryOp, CaseWhen, Expr, ScalarFunc,
    SqlTemplate, TerminatorKind, UnaryOp,
};
pub use handle::Handle;
pub use projection::{Lookup, Projection, Prop, RowShape, ShapeKind};
pub use query::{
    CombineKind, JoinKind, NullsOrder, OrderTerm, Query, QueryOp, QuerySource, SourceId,
    SourceKind,
};
pub use schema::{
    Catalog, CatalogBuilder, Field, Ref, RefCondition, Schema, SchemaError, TableDef, TableId,
};
