//! Expression-level rewrites: constant folding over AND/OR, NULL literal
//! propagation, and COALESCE pruning.

use scalar::{Literal, Value};
use sqltree::{SqlBinaryOp, SqlExpr, SqlFunc, SqlUnaryOp};

use crate::structure;

fn as_literal(expr: &SqlExpr) -> Option<&Value> {
    match expr {
        SqlExpr::Lit { literal, .. } => Some(&literal.value),
        _ => None,
    }
}

fn null() -> SqlExpr {
    SqlExpr::lit(Literal::null())
}

/// True when the expression can be shown to never evaluate to NULL by
/// structure alone. Column references never qualify; neither do division
/// and modulo, which SQLite turns into NULL on a zero divisor.
pub fn provably_not_null(expr: &SqlExpr) -> bool {
    match expr {
        SqlExpr::Lit { literal, .. } => !literal.value.is_null(),
        SqlExpr::Column { .. } => false,
        SqlExpr::Unary { op, inner } => match op {
            SqlUnaryOp::IsNull | SqlUnaryOp::IsNotNull => true,
            SqlUnaryOp::Not | SqlUnaryOp::Neg | SqlUnaryOp::BitNot => provably_not_null(inner),
        },
        SqlExpr::Binary { op, lhs, rhs } => match op {
            SqlBinaryOp::Div | SqlBinaryOp::Mod => false,
            _ => provably_not_null(lhs) && provably_not_null(rhs),
        },
        SqlExpr::Case {
            whens, fallback, ..
        } => {
            whens.iter().all(|(_, then)| provably_not_null(then)) && provably_not_null(fallback)
        }
        SqlExpr::Func { func, args } => match func {
            SqlFunc::Coalesce => args.iter().any(provably_not_null),
            SqlFunc::Count => true,
            _ => false,
        },
        SqlExpr::CountAll | SqlExpr::RowNumber { .. } | SqlExpr::Exists { .. } => true,
        SqlExpr::Cast { expr, .. } => provably_not_null(expr),
        SqlExpr::Subquery(_) | SqlExpr::Raw { .. } => false,
    }
}

/// Simplify one expression bottom-up. Nested queries inside subquery and
/// EXISTS nodes are rewritten by the structural pass on the way.
pub fn simplify_expr(expr: SqlExpr) -> SqlExpr {
    match expr {
        SqlExpr::Lit { .. } | SqlExpr::Column { .. } | SqlExpr::CountAll => expr,
        SqlExpr::Unary { op, inner } => {
            let inner = simplify_expr(*inner);
            match (op, as_literal(&inner)) {
                (SqlUnaryOp::IsNull, Some(value)) => {
                    SqlExpr::lit_inline(Literal::bool(value.is_null()))
                }
                (SqlUnaryOp::IsNotNull, Some(value)) => {
                    SqlExpr::lit_inline(Literal::bool(!value.is_null()))
                }
                (_, Some(Value::Null)) => null(),
                _ => SqlExpr::Unary {
                    op,
                    inner: Box::new(inner),
                },
            }
        }
        SqlExpr::Binary { op, lhs, rhs } => {
            let lhs = simplify_expr(*lhs);
            let rhs = simplify_expr(*rhs);
            match op {
                SqlBinaryOp::And => match (as_literal(&lhs), as_literal(&rhs)) {
                    (Some(Value::Bool(false)), _) | (_, Some(Value::Bool(false))) => {
                        SqlExpr::lit_inline(Literal::bool(false))
                    }
                    (Some(Value::Bool(true)), _) => rhs,
                    (_, Some(Value::Bool(true))) => lhs,
                    _ => SqlExpr::binary(op, lhs, rhs),
                },
                SqlBinaryOp::Or => match (as_literal(&lhs), as_literal(&rhs)) {
                    (Some(Value::Bool(true)), _) | (_, Some(Value::Bool(true))) => {
                        SqlExpr::lit_inline(Literal::bool(true))
                    }
                    (Some(Value::Bool(false)), _) => rhs,
                    (_, Some(Value::Bool(false))) => lhs,
                    _ => SqlExpr::binary(op, lhs, rhs),
                },
                // every other operator is strict in NULL
                _ => {
                    if matches!(as_literal(&lhs), Some(Value::Null))
                        || matches!(as_literal(&rhs), Some(Value::Null))
                    {
                        null()
                    } else {
                        SqlExpr::binary(op, lhs, rhs)
                    }
                }
            }
        }
        SqlExpr::Case {
            subject,
            whens,
            fallback,
        } => SqlExpr::Case {
            subject: subject.map(|s| Box::new(simplify_expr(*s))),
            whens: whens
                .into_iter()
                .map(|(when, then)| (simplify_expr(when), simplify_expr(then)))
                .collect(),
            fallback: Box::new(simplify_expr(*fallback)),
        },
        SqlExpr::Func { func, args } => {
            let args: Vec<SqlExpr> = args.into_iter().map(simplify_expr).collect();
            if func == SqlFunc::Coalesce {
                return simplify_coalesce(args);
            }
            SqlExpr::Func { func, args }
        }
        SqlExpr::RowNumber { order_by } => SqlExpr::RowNumber {
            order_by: order_by
                .into_iter()
                .map(|mut term| {
                    term.expr = simplify_expr(term.expr);
                    term
                })
                .collect(),
        },
        SqlExpr::Subquery(query) => SqlExpr::Subquery(Box::new(structure::pass_query(*query))),
        SqlExpr::Exists { query, negated } => SqlExpr::Exists {
            query: Box::new(structure::pass_query(*query)),
            negated,
        },
        SqlExpr::Cast { expr, to } => SqlExpr::Cast {
            expr: Box::new(simplify_expr(*expr)),
            to,
        },
        SqlExpr::Raw { fragments, args } => SqlExpr::Raw {
            fragments,
            args: args.into_iter().map(simplify_expr).collect(),
        },
    }
}

/// Drop NULL literal arguments and everything after the first argument
/// that can never be NULL; a single remaining argument replaces the call.
fn simplify_coalesce(args: Vec<SqlExpr>) -> SqlExpr {
    let mut kept: Vec<SqlExpr> = Vec::with_capacity(args.len());
    for arg in args {
        if matches!(as_literal(&arg), Some(Value::Null)) {
            continue;
        }
        let done = provably_not_null(&arg);
        kept.push(arg);
        if done {
            break;
        }
    }
    match kept.len() {
        0 => null(),
        1 => kept.into_iter().next().unwrap_or_else(null),
        _ => SqlExpr::Func {
            func: SqlFunc::Coalesce,
            args: kept,
        },
    }
}
