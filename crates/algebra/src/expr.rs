//! Expression model
//!
//! Closed tagged-union expression tree with static type inference. Every
//! node can compute its scalar type (including nullability) from its
//! operands; the rules here are the single source of truth the compiler and
//! the interpreter both rely on.

use scalar::{BaseType, Literal, ScalarType, TypeError};

use crate::projection::{Lookup, Projection};
use crate::query::{Query, QuerySource, SourceKind};
use crate::schema::{Catalog, Ref, Schema, TableId};

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    BitNot,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
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

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Like => "like",
            BinaryOp::In => "in",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }
}

/// Scalar and aggregate function tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFunc {
    Lower,
    Upper,
    Length,
    Concat,
    Coalesce,
    Abs,
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl ScalarFunc {
    /// Aggregation functions are only legal inside a group-by projection or
    /// having clause; the compiler enforces this.
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            ScalarFunc::Count
                | ScalarFunc::Sum
                | ScalarFunc::Avg
                | ScalarFunc::Min
                | ScalarFunc::Max
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarFunc::Lower => "lower",
            ScalarFunc::Upper => "upper",
            ScalarFunc::Length => "length",
            ScalarFunc::Concat => "concat",
            ScalarFunc::Coalesce => "coalesce",
            ScalarFunc::Abs => "abs",
            ScalarFunc::Count => "count",
            ScalarFunc::Sum => "sum",
            ScalarFunc::Avg => "avg",
            ScalarFunc::Min => "min",
            ScalarFunc::Max => "max",
        }
    }
}

/// Operations collapsing a query into one scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminatorKind {
    /// Row count
    Size,
    /// Existence probe
    Some,
    /// Emptiness probe
    Empty,
    /// First row of the scalar projection, after taking 1
    First,
    Max,
    Min,
    Sum,
    /// sum/count over non-null rows; SQL rendering may use native AVG
    Mean,
}

/// One WHEN arm of a CASE expression
#[derive(Debug, Clone)]
pub struct CaseWhen {
    pub when: Expr,
    pub then: Expr,
}

/// Raw SQL template: n+1 text fragments interleaved with n argument
/// expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlTemplate {
    pub fragments: Vec<String>,
}

impl SqlTemplate {
    pub fn new(fragments: Vec<String>) -> Self {
        Self { fragments }
    }

    pub fn verbatim(sql: impl Into<String>) -> Self {
        Self {
            fragments: vec![sql.into()],
        }
    }
}

/// The expression tree. Immutable and referentially transparent; builder
/// methods return new values.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Literal),
    Unary {
        op: UnaryOp,
        inner: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Case {
        subject: Option<Box<Expr>>,
        whens: Vec<CaseWhen>,
        fallback: Box<Expr>,
    },
    Func {
        func: ScalarFunc,
        args: Vec<Expr>,
    },
    /// A value reachable from a query source through a field/ref path
    Locator {
        root: QuerySource,
        path: Vec<String>,
    },
    /// Raw SQL escape hatch; the declared type is trusted
    Sql {
        template: SqlTemplate,
        args: Vec<Expr>,
        ty: ScalarType,
    },
    /// A query collapsed to a single scalar
    Terminator {
        kind: TerminatorKind,
        query: Box<Query>,
    },
}

impl Expr {
    /// Infer the scalar type of this expression, with the nullability
    /// propagation rules of the algebra.
    pub fn scalar_type(&self) -> Result<ScalarType, TypeError> {
        match self {
            Expr::Literal(lit) => Ok(lit.ty.clone()),
            Expr::Unary { op, inner } => {
                let inner_ty = inner.scalar_type()?;
                match op {
                    UnaryOp::Not => {
                        if !inner_ty.base.is_bool() && inner_ty.base != BaseType::Null {
                            return Err(TypeError::NotBool {
                                op: "not".to_string(),
                                found: inner_ty.base,
                            });
                        }
                        Ok(ScalarType {
                            base: BaseType::Bool,
                            nullable: inner_ty.nullable,
                        })
                    }
                    UnaryOp::Neg => {
                        if !inner_ty.base.is_numeric() && inner_ty.base != BaseType::Null {
                            return Err(TypeError::NotNumeric {
                                op: "-".to_string(),
                                found: inner_ty.base,
                            });
                        }
                        Ok(ScalarType {
                            base: BaseType::F64,
                            nullable: inner_ty.nullable,
                        })
                    }
                    UnaryOp::BitNot => {
                        if !inner_ty.base.is_integer() && inner_ty.base != BaseType::Null {
                            return Err(TypeError::NotInteger {
                                op: "~".to_string(),
                                found: inner_ty.base,
                            });
                        }
                        Ok(ScalarType {
                            base: BaseType::I64,
                            nullable: inner_ty.nullable,
                        })
                    }
                }
            }
            Expr::Binary { op, lhs, rhs } => binary_type(*op, lhs, rhs),
            Expr::Case {
                subject: _,
                whens,
                fallback,
            } => {
                let mut ty = fallback.scalar_type()?;
                for arm in whens {
                    let arm_ty = arm.then.scalar_type()?;
                    ty = ty.merge(&arm_ty)?;
                }
                Ok(ty)
            }
            Expr::Func { func, args } => func_type(*func, args),
            Expr::Locator { root, path } => locator_type(root, path),
            Expr::Sql { ty, .. } => Ok(ty.clone()),
            Expr::Terminator { kind, query } => terminator_type(*kind, query),
        }
    }

    /// True if any aggregation function appears outside a terminator
    /// sub-query. Used by the compiler to reject aggregates in
    /// non-aggregating positions.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Literal(_) | Expr::Locator { .. } => false,
            Expr::Unary { inner, .. } => inner.contains_aggregate(),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.contains_aggregate() || rhs.contains_aggregate()
            }
            Expr::Case {
                subject,
                whens,
                fallback,
            } => {
                subject.as_deref().is_some_and(Expr::contains_aggregate)
                    || whens
                        .iter()
                        .any(|w| w.when.contains_aggregate() || w.then.contains_aggregate())
                    || fallback.contains_aggregate()
            }
            Expr::Func { func, args } => {
                func.is_aggregate() || args.iter().any(Expr::contains_aggregate)
            }
            Expr::Sql { args, .. } => args.iter().any(Expr::contains_aggregate),
            // A terminator is its own aggregation context
            Expr::Terminator { .. } => false,
        }
    }
}

fn binary_type(op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<ScalarType, TypeError> {
    let lt = lhs.scalar_type()?;
    let rt = rhs.scalar_type()?;
    let nullable = lt.nullable || rt.nullable;
    let numeric_operand = |ty: &ScalarType| -> Result<(), TypeError> {
        if ty.base.is_numeric() || ty.base == BaseType::Null {
            Ok(())
        } else {
            Err(TypeError::NotNumeric {
                op: op.symbol().to_string(),
                found: ty.base.clone(),
            })
        }
    };
    match op {
        BinaryOp::Add => {
            if lt.base.is_text() || rt.base.is_text() {
                // String concatenation spelled as +
                for ty in [&lt, &rt] {
                    if !ty.base.is_text() && !ty.base.is_numeric() && ty.base != BaseType::Null {
                        return Err(TypeError::NotText {
                            op: "+".to_string(),
                            found: ty.base.clone(),
                        });
                    }
                }
                Ok(ScalarType {
                    base: BaseType::Text,
                    nullable,
                })
            } else {
                numeric_operand(&lt)?;
                numeric_operand(&rt)?;
                Ok(ScalarType {
                    base: BaseType::F64,
                    nullable,
                })
            }
        }
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            numeric_operand(&lt)?;
            numeric_operand(&rt)?;
            Ok(ScalarType {
                base: BaseType::F64,
                nullable,
            })
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Like => {
            Ok(ScalarType {
                base: BaseType::Bool,
                nullable,
            })
        }
        BinaryOp::And | BinaryOp::Or => {
            for ty in [&lt, &rt] {
                if !ty.base.is_bool() && ty.base != BaseType::Null {
                    return Err(TypeError::NotBool {
                        op: op.symbol().to_string(),
                        found: ty.base.clone(),
                    });
                }
            }
            Ok(ScalarType {
                base: BaseType::Bool,
                nullable,
            })
        }
        // Two-valued equality: never NULL, re-derived explicitly by the
        // compiler rather than inherited from SQL
        BinaryOp::Eq | BinaryOp::Ne => Ok(ScalarType::new(BaseType::Bool)),
        BinaryOp::In => {
            match &rt.base {
                BaseType::Array(item) => {
                    if item.base != lt.base
                        && item.base != BaseType::Null
                        && lt.base != BaseType::Null
                        && !(item.base.is_numeric() && lt.base.is_numeric())
                    {
                        return Err(TypeError::InOperandMismatch {
                            left: lt.base.clone(),
                            right: rt.base.clone(),
                        });
                    }
                }
                BaseType::Null => {}
                other => {
                    return Err(TypeError::InOperandMismatch {
                        left: lt.base.clone(),
                        right: other.clone(),
                    })
                }
            }
            Ok(ScalarType {
                base: BaseType::Bool,
                nullable,
            })
        }
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr => {
            for ty in [&lt, &rt] {
                if !ty.base.is_integer() && ty.base != BaseType::Null {
                    return Err(TypeError::NotInteger {
                        op: op.symbol().to_string(),
                        found: ty.base.clone(),
                    });
                }
            }
            Ok(ScalarType {
                base: BaseType::I64,
                nullable,
            })
        }
    }
}

fn func_type(func: ScalarFunc, args: &[Expr]) -> Result<ScalarType, TypeError> {
    let arg_ty = |i: usize| -> Result<ScalarType, TypeError> {
        args.get(i)
            .ok_or_else(|| TypeError::FuncArity {
                func: func.name().to_string(),
                expected: i + 1,
                found: args.len(),
            })?
            .scalar_type()
    };
    match func {
        ScalarFunc::Lower | ScalarFunc::Upper => {
            let ty = arg_ty(0)?;
            if !ty.base.is_text() && ty.base != BaseType::Null {
                return Err(TypeError::NotText {
                    op: func.name().to_string(),
                    found: ty.base,
                });
            }
            Ok(ScalarType {
                base: BaseType::Text,
                nullable: ty.nullable,
            })
        }
        ScalarFunc::Length => {
            let ty = arg_ty(0)?;
            if !ty.base.is_text() && ty.base != BaseType::Null {
                return Err(TypeError::NotText {
                    op: "length".to_string(),
                    found: ty.base,
                });
            }
            Ok(ScalarType {
                base: BaseType::I64,
                nullable: ty.nullable,
            })
        }
        ScalarFunc::Concat => {
            let mut nullable = false;
            for arg in args {
                let ty = arg.scalar_type()?;
                if !ty.base.is_text() && ty.base != BaseType::Null {
                    return Err(TypeError::NotText {
                        op: "concat".to_string(),
                        found: ty.base,
                    });
                }
                nullable = nullable || ty.nullable;
            }
            Ok(ScalarType {
                base: BaseType::Text,
                nullable,
            })
        }
        ScalarFunc::Coalesce => {
            let mut merged: Option<ScalarType> = None;
            let mut all_nullable = true;
            for arg in args {
                let ty = arg.scalar_type()?;
                all_nullable = all_nullable && ty.nullable;
                merged = Some(match merged {
                    None => ty,
                    Some(m) => m.merge(&ty)?,
                });
            }
            let merged = merged.unwrap_or(ScalarType::nullable(BaseType::Null));
            Ok(ScalarType {
                base: merged.base,
                nullable: all_nullable,
            })
        }
        ScalarFunc::Abs => {
            let ty = arg_ty(0)?;
            if !ty.base.is_numeric() && ty.base != BaseType::Null {
                return Err(TypeError::NotNumeric {
                    op: "abs".to_string(),
                    found: ty.base,
                });
            }
            Ok(ty)
        }
        // count never returns NULL, not even for an empty group
        ScalarFunc::Count => Ok(ScalarType::new(BaseType::I64)),
        // Empty-group semantics: these yield NULL for an empty input, so
        // they are nullable no matter what their argument is
        ScalarFunc::Sum | ScalarFunc::Avg | ScalarFunc::Min | ScalarFunc::Max => {
            let ty = arg_ty(0)?;
            Ok(ScalarType {
                base: ty.base,
                nullable: true,
            })
        }
    }
}

fn locator_type(root: &QuerySource, path: &[String]) -> Result<ScalarType, TypeError> {
    // Resolve against the wrapped query's own projection (or the schema for
    // base tables). Resolving against `root.projection()` would loop: that
    // projection's props are locators rooted at `root` itself.
    match root.kind() {
        SourceKind::Table { catalog, table } => resolve_in_table(catalog, *table, path, false),
        SourceKind::View {
            catalog, schema, ..
        } => resolve_in_schema(catalog, schema, path, false),
        SourceKind::Query(q) => resolve_path(&q.projection, path, false),
    }
}

fn resolve_path(
    projection: &Projection,
    path: &[String],
    via_nullable: bool,
) -> Result<ScalarType, TypeError> {
    match projection {
        Projection::Scalar { expr } => {
            if path.is_empty() {
                Ok(expr.scalar_type()?.with_nullable(via_nullable))
            } else {
                Err(TypeError::UnknownProp {
                    name: path[0].clone(),
                })
            }
        }
        Projection::Object {
            nullable, catalog, ..
        } => {
            let via = via_nullable || *nullable;
            match projection.lookup(path) {
                Lookup::Prop(prop) => Ok(prop.expr.scalar_type()?.with_nullable(via)),
                Lookup::Ref { r, rest } => match r {
                    Ref::Forward {
                        target, nullable, ..
                    } => resolve_in_table(catalog, *target, rest, via || *nullable),
                    Ref::Back { name, .. } => Err(TypeError::BackRefInExpr { name: name.clone() }),
                },
                Lookup::NotFound => Err(TypeError::UnknownProp {
                    name: path.first().cloned().unwrap_or_default(),
                }),
            }
        }
    }
}

/// Resolve the tail of a locator path inside a catalog table, following
/// forward refs and accumulating nullability from each nullable hop.
fn resolve_in_table(
    catalog: &Catalog,
    table: TableId,
    path: &[String],
    via_nullable: bool,
) -> Result<ScalarType, TypeError> {
    resolve_in_schema(catalog, &catalog.table_def(table).schema, path, via_nullable)
}

fn resolve_in_schema(
    catalog: &Catalog,
    schema: &Schema,
    path: &[String],
    via_nullable: bool,
) -> Result<ScalarType, TypeError> {
    let first = path.first().ok_or(TypeError::ScalarQueryRequired)?;
    if let Some(field) = schema.field(first) {
        if path.len() == 1 {
            Ok(field.ty.with_nullable(via_nullable))
        } else {
            Err(TypeError::UnknownProp {
                name: path[1].clone(),
            })
        }
    } else if let Some(r) = schema.ref_by_name(first) {
        match r {
            Ref::Forward {
                target, nullable, ..
            } => resolve_in_table(catalog, *target, &path[1..], via_nullable || *nullable),
            Ref::Back { name, .. } => Err(TypeError::BackRefInExpr { name: name.clone() }),
        }
    } else {
        Err(TypeError::UnknownProp {
            name: first.clone(),
        })
    }
}

fn terminator_type(kind: TerminatorKind, query: &Query) -> Result<ScalarType, TypeError> {
    match kind {
        TerminatorKind::Size => Ok(ScalarType::new(BaseType::I64)),
        TerminatorKind::Some | TerminatorKind::Empty => Ok(ScalarType::new(BaseType::Bool)),
        TerminatorKind::First => {
            let ty = query.projection.scalar_type()?;
            Ok(ty.as_nullable())
        }
        TerminatorKind::Max | TerminatorKind::Min | TerminatorKind::Sum => {
            let ty = query.projection.scalar_type()?;
            Ok(ty.as_nullable())
        }
        TerminatorKind::Mean => Ok(ScalarType::nullable(BaseType::F64)),
    }
}

// ---------------------------------------------------------------------------
// Builders

impl Expr {
    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn add(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Add, self, rhs.into())
    }

    pub fn sub(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Sub, self, rhs.into())
    }

    pub fn mul(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Mul, self, rhs.into())
    }

    pub fn div(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Div, self, rhs.into())
    }

    pub fn modulo(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Mod, self, rhs.into())
    }

    pub fn eq(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Eq, self, rhs.into())
    }

    pub fn ne(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Ne, self, rhs.into())
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Lt, self, rhs.into())
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Le, self, rhs.into())
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Gt, self, rhs.into())
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Ge, self, rhs.into())
    }

    pub fn and(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::And, self, rhs.into())
    }

    pub fn or(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Or, self, rhs.into())
    }

    pub fn like(self, pattern: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Like, self, pattern.into())
    }

    pub fn in_array(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::In, self, rhs.into())
    }

    pub fn bit_and(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::BitAnd, self, rhs.into())
    }

    pub fn bit_or(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::BitOr, self, rhs.into())
    }

    pub fn bit_xor(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::BitXor, self, rhs.into())
    }

    pub fn shl(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Shl, self, rhs.into())
    }

    pub fn shr(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Shr, self, rhs.into())
    }

    pub fn not(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            inner: Box::new(self),
        }
    }

    pub fn neg(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Neg,
            inner: Box::new(self),
        }
    }

    pub fn bit_not(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::BitNot,
            inner: Box::new(self),
        }
    }

    pub fn raw(template: SqlTemplate, args: Vec<Expr>, ty: ScalarType) -> Expr {
        Expr::Sql { template, args, ty }
    }
}

impl From<Literal> for Expr {
    fn from(lit: Literal) -> Self {
        Expr::Literal(lit)
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Literal(Literal::i64(n))
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::Literal(Literal::i32(n))
    }
}

impl From<f64> for Expr {
    fn from(n: f64) -> Self {
        Expr::Literal(Literal::f64(n))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Literal(Literal::bool(b))
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Literal(Literal::text(s))
    }
}

/// Searched or simple CASE. Pass `None` for a searched CASE whose WHEN arms
/// are boolean predicates.
pub fn case(subject: Option<Expr>, whens: Vec<CaseWhen>, fallback: Expr) -> Expr {
    Expr::Case {
        subject: subject.map(Box::new),
        whens,
        fallback: Box::new(fallback),
    }
}

pub fn lower(arg: impl Into<Expr>) -> Expr {
    Expr::Func {
        func: ScalarFunc::Lower,
        args: vec![arg.into()],
    }
}

pub fn upper(arg: impl Into<Expr>) -> Expr {
    Expr::Func {
        func: ScalarFunc::Upper,
        args: vec![arg.into()],
    }
}

pub fn length(arg: impl Into<Expr>) -> Expr {
    Expr::Func {
        func: ScalarFunc::Length,
        args: vec![arg.into()],
    }
}

pub fn concat(args: Vec<Expr>) -> Expr {
    Expr::Func {
        func: ScalarFunc::Concat,
        args,
    }
}

pub fn coalesce(args: Vec<Expr>) -> Expr {
    Expr::Func {
        func: ScalarFunc::Coalesce,
        args,
    }
}

pub fn abs(arg: impl Into<Expr>) -> Expr {
    Expr::Func {
        func: ScalarFunc::Abs,
        args: vec![arg.into()],
    }
}
