//! Neutral SQL tree and dialect renderers
//!
//! The compiler lowers the query algebra into this dialect-independent AST;
//! the renderers turn it into SQL text plus a flat parameter list for
//! SQLite, PostgreSQL, or MySQL.

pub mod ast;
pub mod dialect;
pub mod render;

pub use ast::{
    CastType, Combination, CombinationKind, Select, SelectColumn, SqlBinaryOp, SqlExpr, SqlJoin,
    SqlJoinKind, SqlNulls, SqlOrderBy, SqlQuery, SqlSource, SqlUnaryOp, SqlFunc,
};
pub use dialect::{Dialect, MySqlDialect, PostgresDialect, SqliteDialect};
pub use render::{render, RenderOptions, RenderedSql};
