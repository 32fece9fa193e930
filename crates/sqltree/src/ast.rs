//! The dialect-independent SQL tree

use scalar::Literal;

/// A renderable SQL query: a SELECT or a set combination of two queries
#[derive(Debug, Clone, PartialEq)]
pub enum SqlQuery {
    Select(Box<Select>),
    Combination(Box<Combination>),
}

impl SqlQuery {
    pub fn select(select: Select) -> Self {
        SqlQuery::Select(Box::new(select))
    }

    pub fn combination(kind: CombinationKind, left: SqlQuery, right: SqlQuery) -> Self {
        SqlQuery::Combination(Box::new(Combination { kind, left, right }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinationKind {
    Union,
    UnionAll,
    Intersect,
    Except,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Combination {
    pub kind: CombinationKind,
    pub left: SqlQuery,
    pub right: SqlQuery,
}

/// One SELECT statement
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub distinct: bool,
    pub columns: Vec<SelectColumn>,
    pub from: Option<SqlSource>,
    pub joins: Vec<SqlJoin>,
    pub where_clause: Option<SqlExpr>,
    pub group_by: Vec<SqlExpr>,
    pub having: Option<SqlExpr>,
    pub order_by: Vec<SqlOrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Select {
    pub fn new(from: Option<SqlSource>) -> Self {
        Self {
            distinct: false,
            columns: Vec::new(),
            from,
            joins: Vec::new(),
            where_clause: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectColumn {
    pub expr: SqlExpr,
    pub alias: String,
}

impl SelectColumn {
    pub fn new(expr: SqlExpr, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: alias.into(),
        }
    }
}

/// A FROM or JOIN target
#[derive(Debug, Clone, PartialEq)]
pub enum SqlSource {
    Table {
        name: String,
        alias: String,
    },
    Subquery {
        query: Box<SqlQuery>,
        alias: String,
    },
    /// Raw SQL view text: n+1 fragments interleaved with n argument
    /// expressions
    Raw {
        fragments: Vec<String>,
        args: Vec<SqlExpr>,
        alias: String,
    },
}

impl SqlSource {
    pub fn alias(&self) -> &str {
        match self {
            SqlSource::Table { alias, .. } => alias,
            SqlSource::Subquery { alias, .. } => alias,
            SqlSource::Raw { alias, .. } => alias,
        }
    }

    pub fn set_alias(&mut self, new_alias: String) {
        match self {
            SqlSource::Table { alias, .. } => *alias = new_alias,
            SqlSource::Subquery { alias, .. } => *alias = new_alias,
            SqlSource::Raw { alias, .. } => *alias = new_alias,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlJoinKind {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlJoin {
    pub kind: SqlJoinKind,
    pub source: SqlSource,
    pub on: Option<SqlExpr>,
    /// The right side may reference columns of the left side per row
    pub lateral: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlNulls {
    Default,
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlOrderBy {
    pub expr: SqlExpr,
    pub desc: bool,
    pub nulls: SqlNulls,
}

impl SqlOrderBy {
    pub fn asc(expr: SqlExpr) -> Self {
        Self {
            expr,
            desc: false,
            nulls: SqlNulls::Default,
        }
    }

    pub fn desc(expr: SqlExpr) -> Self {
        Self {
            expr,
            desc: true,
            nulls: SqlNulls::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlUnaryOp {
    Not,
    Neg,
    BitNot,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlBinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// String concatenation (`||` or CONCAT() depending on dialect)
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Like,
    In,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlFunc {
    Lower,
    Upper,
    Length,
    Coalesce,
    Abs,
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Concat,
}

impl SqlFunc {
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            SqlFunc::Count | SqlFunc::Sum | SqlFunc::Avg | SqlFunc::Min | SqlFunc::Max
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastType {
    Int,
    Float,
    Text,
}

/// A SQL scalar expression
#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    /// A literal; rendered as a placeholder when `parameter` is set and
    /// parameterized rendering is enabled
    Lit { literal: Literal, parameter: bool },
    Column {
        table: String,
        column: String,
    },
    Unary {
        op: SqlUnaryOp,
        inner: Box<SqlExpr>,
    },
    Binary {
        op: SqlBinaryOp,
        lhs: Box<SqlExpr>,
        rhs: Box<SqlExpr>,
    },
    Case {
        subject: Option<Box<SqlExpr>>,
        whens: Vec<(SqlExpr, SqlExpr)>,
        fallback: Box<SqlExpr>,
    },
    Func {
        func: SqlFunc,
        args: Vec<SqlExpr>,
    },
    /// COUNT(*)
    CountAll,
    /// ROW_NUMBER() OVER (ORDER BY ...)
    RowNumber { order_by: Vec<SqlOrderBy> },
    /// Scalar subquery
    Subquery(Box<SqlQuery>),
    Exists {
        query: Box<SqlQuery>,
        negated: bool,
    },
    Cast {
        expr: Box<SqlExpr>,
        to: CastType,
    },
    /// Raw SQL fragment with interleaved argument expressions
    Raw {
        fragments: Vec<String>,
        args: Vec<SqlExpr>,
    },
}

impl SqlExpr {
    pub fn lit(literal: Literal) -> Self {
        SqlExpr::Lit {
            literal,
            parameter: true,
        }
    }

    /// A literal rendered inline even in parameterized mode; used for
    /// internal constants like the concat side tags.
    pub fn lit_inline(literal: Literal) -> Self {
        SqlExpr::Lit {
            literal,
            parameter: false,
        }
    }

    pub fn column(table: impl Into<String>, column: impl Into<String>) -> Self {
        SqlExpr::Column {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn binary(op: SqlBinaryOp, lhs: SqlExpr, rhs: SqlExpr) -> Self {
        SqlExpr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn and(lhs: SqlExpr, rhs: SqlExpr) -> Self {
        SqlExpr::binary(SqlBinaryOp::And, lhs, rhs)
    }

    pub fn or(lhs: SqlExpr, rhs: SqlExpr) -> Self {
        SqlExpr::binary(SqlBinaryOp::Or, lhs, rhs)
    }

    pub fn is_null(inner: SqlExpr) -> Self {
        SqlExpr::Unary {
            op: SqlUnaryOp::IsNull,
            inner: Box::new(inner),
        }
    }

    pub fn is_not_null(inner: SqlExpr) -> Self {
        SqlExpr::Unary {
            op: SqlUnaryOp::IsNotNull,
            inner: Box::new(inner),
        }
    }

    /// COALESCE(expr, FALSE): collapses three-valued logic back to the
    /// algebra's two-valued booleans at SELECT/WHERE boundaries.
    pub fn coalesce_false(inner: SqlExpr) -> Self {
        SqlExpr::Func {
            func: SqlFunc::Coalesce,
            args: vec![inner, SqlExpr::lit_inline(Literal::bool(false))],
        }
    }
}
