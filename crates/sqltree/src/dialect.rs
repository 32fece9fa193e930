//! Dialect hooks for the renderer
//!
//! The renderer walks the SQL tree once; everything SQLite, PostgreSQL and
//! MySQL disagree about is funneled through this trait.

use scalar::{BaseType, ScalarType};

use crate::ast::CastType;

/// How a dialect handles NULLS FIRST / NULLS LAST in ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsHandling {
    /// The dialect accepts the NULLS keyword. When `always_explicit` is
    /// set the renderer spells it out even for the default placement.
    Keyword { always_explicit: bool },
    /// No NULLS keyword; the renderer prepends an `(expr IS NULL)` term
    /// to force the requested placement.
    Emulate,
}

pub trait Dialect {
    fn name(&self) -> &'static str;

    fn quote_ident(&self, ident: &str) -> String;

    /// Placeholder for the n-th parameter (1-based). PostgreSQL needs a
    /// type cast alongside the numbered placeholder so the server can
    /// infer parameter types in nested positions.
    fn placeholder(&self, index: usize, ty: &ScalarType) -> String;

    /// Native bitwise-XOR operator, if the dialect has one. SQLite has
    /// none and gets `(~(a & b)) & (a | b)` instead.
    fn native_xor(&self) -> Option<&'static str> {
        None
    }

    /// MySQL has no `||` operator in default SQL mode; string
    /// concatenation goes through CONCAT().
    fn concat_via_function(&self) -> bool {
        false
    }

    /// Function name for string length in characters. MySQL's LENGTH()
    /// counts bytes, so it uses CHAR_LENGTH.
    fn length_function(&self) -> &'static str {
        "LENGTH"
    }

    fn cast_type(&self, to: CastType) -> &'static str;

    fn nulls_handling(&self) -> NullsHandling;

    /// Whether JOIN sources carry an explicit LATERAL keyword. SQLite
    /// permits correlated references in join subqueries without one.
    fn supports_lateral_keyword(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn placeholder(&self, _index: usize, _ty: &ScalarType) -> String {
        "?".to_string()
    }

    fn cast_type(&self, to: CastType) -> &'static str {
        match to {
            CastType::Int => "INTEGER",
            CastType::Float => "REAL",
            CastType::Text => "TEXT",
        }
    }

    fn nulls_handling(&self) -> NullsHandling {
        NullsHandling::Keyword {
            always_explicit: false,
        }
    }

    fn supports_lateral_keyword(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize, ty: &ScalarType) -> String {
        let cast = match &ty.base {
            BaseType::Bool => Some("boolean"),
            b if b.is_integer() => Some("int8"),
            b if b.is_float() => Some("float8"),
            BaseType::Text => Some("text"),
            _ => None,
        };
        match cast {
            Some(cast) => format!("${}::{}", index, cast),
            None => format!("${}", index),
        }
    }

    fn native_xor(&self) -> Option<&'static str> {
        Some("#")
    }

    fn cast_type(&self, to: CastType) -> &'static str {
        match to {
            CastType::Int => "INT8",
            CastType::Float => "FLOAT8",
            CastType::Text => "TEXT",
        }
    }

    fn nulls_handling(&self) -> NullsHandling {
        // PostgreSQL defaults to nulls-last on ASC, the opposite of
        // SQLite and MySQL, so the placement is always spelled out.
        NullsHandling::Keyword {
            always_explicit: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn placeholder(&self, _index: usize, _ty: &ScalarType) -> String {
        "?".to_string()
    }

    fn native_xor(&self) -> Option<&'static str> {
        Some("^")
    }

    fn concat_via_function(&self) -> bool {
        true
    }

    fn length_function(&self) -> &'static str {
        "CHAR_LENGTH"
    }

    fn cast_type(&self, to: CastType) -> &'static str {
        match to {
            CastType::Int => "SIGNED",
            CastType::Float => "DOUBLE",
            CastType::Text => "CHAR",
        }
    }

    fn nulls_handling(&self) -> NullsHandling {
        NullsHandling::Emulate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ident_quoting() {
        assert_eq!(SqliteDialect.quote_ident("users"), "\"users\"");
        assert_eq!(MySqlDialect.quote_ident("users"), "`users`");
        assert_eq!(SqliteDialect.quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(MySqlDialect.quote_ident("a`b"), "`a``b`");
    }

    #[test]
    fn test_postgres_placeholder_carries_cast() {
        let ty = ScalarType::new(BaseType::I64);
        assert_eq!(PostgresDialect.placeholder(3, &ty), "$3::int8");
        let ty = ScalarType::new(BaseType::Text);
        assert_eq!(PostgresDialect.placeholder(1, &ty), "$1::text");
    }
}
