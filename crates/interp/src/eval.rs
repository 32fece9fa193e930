//! Direct evaluation of the query algebra over in-memory tables.
//!
//! Joins are nested loops, set operations are naive list scans, and
//! relationship locators re-run lookups against the target table per row.
//! Nothing here is fast; it defines the semantics the compiled SQL is
//! checked against.

use std::cmp::Ordering;
use std::collections::HashMap;

use algebra::{
    names, BinaryOp, CaseWhen, CombineKind, Expr, JoinKind, Lookup, NullsOrder, OrderTerm,
    Projection, Query, QueryOp, QuerySource, Ref, ScalarFunc, SourceId, SourceKind, TableId,
    TerminatorKind, UnaryOp,
};
use scalar::Value;

use crate::database::{Database, Row};
use crate::error::InterpError;

type Env = HashMap<SourceId, Row>;

/// Evaluate a query against the database, producing flat rows keyed by the
/// query's projection aliases.
pub fn interpret(query: &Query, db: &Database) -> Result<Vec<Row>, InterpError> {
    let env = Env::new();
    let rows = eval_query(query, &env, db)?;
    tracing::debug!(rows = rows.len(), "interpreted query");
    Ok(rows)
}

fn eval_query(query: &Query, env: &Env, db: &Database) -> Result<Vec<Row>, InterpError> {
    if let QueryOp::Combine { kind, other } = &query.op {
        return eval_combine(query, *kind, other, env, db);
    }

    let source = &query.source;
    let src_rows = source_rows(source, env, db)?;
    let sid = source.id();

    match &query.op {
        QueryOp::Proxy | QueryOp::Map => {
            project_all(&query.projection, sid, src_rows, env, db)
        }
        QueryOp::Filter { predicate } => {
            let mut kept = Vec::new();
            for row in src_rows {
                let scope = bind(env, sid, row.clone());
                if is_true(&eval_expr(predicate, &scope, db)?) {
                    kept.push(row);
                }
            }
            project_all(&query.projection, sid, kept, env, db)
        }
        QueryOp::OrderBy { terms } => {
            let mut keyed = Vec::with_capacity(src_rows.len());
            for row in src_rows {
                let scope = bind(env, sid, row.clone());
                let mut keys = Vec::with_capacity(terms.len());
                for term in terms {
                    keys.push(eval_expr(&term.expr, &scope, db)?);
                }
                keyed.push((keys, row));
            }
            keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, terms));
            project_all(
                &query.projection,
                sid,
                keyed.into_iter().map(|(_, r)| r).collect(),
                env,
                db,
            )
        }
        QueryOp::GroupBy { .. } => Err(InterpError::GroupByUnsupported),
        QueryOp::Join {
            kind,
            right,
            on,
            lateral: _,
        } => eval_join(query, *kind, right, on.as_ref(), src_rows, env, db),
        QueryOp::Unique => {
            let projected = project_all(&query.projection, sid, src_rows, env, db)?;
            Ok(dedup_rows(projected))
        }
        QueryOp::Paginate { limit, offset } => {
            let projected = project_all(&query.projection, sid, src_rows, env, db)?;
            let skip = offset.unwrap_or(0) as usize;
            let take = limit.map(|l| l as usize).unwrap_or(usize::MAX);
            Ok(projected.into_iter().skip(skip).take(take).collect())
        }
        QueryOp::Combine { .. } => unreachable!("handled above"),
    }
}

fn source_rows(source: &QuerySource, env: &Env, db: &Database) -> Result<Vec<Row>, InterpError> {
    match source.kind() {
        SourceKind::Table { table, .. } => Ok(db.rows(*table).to_vec()),
        SourceKind::View { .. } => Err(InterpError::RawSqlUnsupported),
        SourceKind::Query(q) => eval_query(q, env, db),
    }
}

fn bind(env: &Env, id: SourceId, row: Row) -> Env {
    let mut scope = env.clone();
    scope.insert(id, row);
    scope
}

fn project_all(
    projection: &Projection,
    sid: SourceId,
    rows: Vec<Row>,
    env: &Env,
    db: &Database,
) -> Result<Vec<Row>, InterpError> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let scope = bind(env, sid, row);
        out.push(project(projection, &scope, db)?);
    }
    Ok(out)
}

fn project(projection: &Projection, env: &Env, db: &Database) -> Result<Row, InterpError> {
    match projection {
        Projection::Scalar { expr } => {
            let mut row = Row::new();
            row.insert(names::SCALAR_COLUMN.to_string(), eval_expr(expr, env, db)?);
            Ok(row)
        }
        Projection::Object { props, .. } => {
            let mut row = Row::new();
            for prop in props {
                row.insert(prop.alias(), eval_expr(&prop.expr, env, db)?);
            }
            Ok(row)
        }
    }
}

// ---------------------------------------------------------------------------
// Joins

fn projection_aliases(projection: &Projection) -> Vec<String> {
    match projection {
        Projection::Scalar { .. } => vec![names::SCALAR_COLUMN.to_string()],
        Projection::Object { props, .. } => props.iter().map(|p| p.alias()).collect(),
    }
}

fn null_row(aliases: &[String]) -> Row {
    aliases
        .iter()
        .map(|a| (a.clone(), Value::Null))
        .collect()
}

fn eval_join(
    query: &Query,
    kind: JoinKind,
    right: &QuerySource,
    on: Option<&Expr>,
    left_rows: Vec<Row>,
    env: &Env,
    db: &Database,
) -> Result<Vec<Row>, InterpError> {
    let left_id = query.source.id();
    let right_id = right.id();
    let left_aliases = projection_aliases(&query.source.projection());
    let right_aliases = projection_aliases(&right.projection());

    let matches = |scope: &Env| -> Result<bool, InterpError> {
        match on {
            Some(expr) => Ok(is_true(&eval_expr(expr, scope, db)?)),
            None => Ok(true),
        }
    };

    let mut out = Vec::new();
    match kind {
        // Left-major evaluation; the right side re-evaluates per left row,
        // which is what makes lateral correlation work.
        JoinKind::Inner | JoinKind::Left => {
            for lrow in left_rows {
                let left_scope = bind(env, left_id, lrow);
                let right_rows = source_rows(right, &left_scope, db)?;
                let mut matched = false;
                for rrow in right_rows {
                    let scope = bind(&left_scope, right_id, rrow);
                    if matches(&scope)? {
                        out.push(project(&query.projection, &scope, db)?);
                        matched = true;
                    }
                }
                if kind == JoinKind::Left && !matched {
                    let scope = bind(&left_scope, right_id, null_row(&right_aliases));
                    out.push(project(&query.projection, &scope, db)?);
                }
            }
        }
        JoinKind::Right => {
            let right_rows = source_rows(right, env, db)?;
            for rrow in right_rows {
                let right_scope = bind(env, right_id, rrow);
                let mut matched = false;
                for lrow in &left_rows {
                    let scope = bind(&right_scope, left_id, lrow.clone());
                    if matches(&scope)? {
                        out.push(project(&query.projection, &scope, db)?);
                        matched = true;
                    }
                }
                if !matched {
                    let scope = bind(&right_scope, left_id, null_row(&left_aliases));
                    out.push(project(&query.projection, &scope, db)?);
                }
            }
        }
        // Inner matches first in left-major order, then unmatched left rows,
        // then unmatched right rows.
        JoinKind::Full => {
            let right_rows = source_rows(right, env, db)?;
            let mut right_matched = vec![false; right_rows.len()];
            let mut left_unmatched = Vec::new();
            for lrow in left_rows {
                let left_scope = bind(env, left_id, lrow.clone());
                let mut matched = false;
                for (i, rrow) in right_rows.iter().enumerate() {
                    let scope = bind(&left_scope, right_id, rrow.clone());
                    if matches(&scope)? {
                        out.push(project(&query.projection, &scope, db)?);
                        matched = true;
                        right_matched[i] = true;
                    }
                }
                if !matched {
                    left_unmatched.push(lrow);
                }
            }
            for lrow in left_unmatched {
                let scope = bind(env, left_id, lrow);
                let scope = bind(&scope, right_id, null_row(&right_aliases));
                out.push(project(&query.projection, &scope, db)?);
            }
            for (i, rrow) in right_rows.into_iter().enumerate() {
                if !right_matched[i] {
                    let scope = bind(env, right_id, rrow);
                    let scope = bind(&scope, left_id, null_row(&left_aliases));
                    out.push(project(&query.projection, &scope, db)?);
                }
            }
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Combinations

fn eval_combine(
    query: &Query,
    kind: CombineKind,
    other: &Query,
    env: &Env,
    db: &Database,
) -> Result<Vec<Row>, InterpError> {
    let mut left_aliases = projection_aliases(&query.projection);
    let mut right_aliases = projection_aliases(&other.projection);
    left_aliases.sort();
    right_aliases.sort();
    if left_aliases != right_aliases {
        return Err(InterpError::ShapeMismatch {
            left: left_aliases,
            right: right_aliases,
        });
    }

    let left = source_rows(&query.source, env, db)?;
    let right = eval_query(other, env, db)?;

    Ok(match kind {
        CombineKind::Concat | CombineKind::UnionAll => {
            let mut rows = left;
            rows.extend(right);
            rows
        }
        CombineKind::Union => {
            let mut rows = left;
            rows.extend(right);
            dedup_rows(rows)
        }
        CombineKind::Intersect => {
            let kept: Vec<Row> = left
                .into_iter()
                .filter(|row| contains_row(&right, row))
                .collect();
            dedup_rows(kept)
        }
        CombineKind::Except => {
            let kept: Vec<Row> = left
                .into_iter()
                .filter(|row| !contains_row(&right, row))
                .collect();
            dedup_rows(kept)
        }
    })
}

/// Semantic row equality: same aliases, values equal under the total order
/// (so 1 and 1.0 coincide, and NULL equals NULL).
fn rows_equal(a: &Row, b: &Row) -> bool {
    a.len() == b.len()
        && a.iter().all(|(key, value)| {
            b.get(key)
                .is_some_and(|other| value.total_cmp(other) == Ordering::Equal)
        })
}

fn contains_row(rows: &[Row], row: &Row) -> bool {
    rows.iter().any(|r| rows_equal(r, row))
}

fn dedup_rows(rows: Vec<Row>) -> Vec<Row> {
    let mut out: Vec<Row> = Vec::with_capacity(rows.len());
    for row in rows {
        if !contains_row(&out, &row) {
            out.push(row);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Ordering

fn compare_keys(a: &[Value], b: &[Value], terms: &[OrderTerm]) -> Ordering {
    for (i, term) in terms.iter().enumerate() {
        let ord = compare_term(&a[i], &b[i], term);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn compare_term(a: &Value, b: &Value, term: &OrderTerm) -> Ordering {
    // NULLs sort first ascending and last descending unless overridden
    let nulls_first = match term.nulls {
        NullsOrder::Default => !term.desc,
        NullsOrder::First => true,
        NullsOrder::Last => false,
    };
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => {
            if nulls_first {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (false, true) => {
            if nulls_first {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (false, false) => {
            let ord = a.total_cmp(b);
            if term.desc {
                ord.reverse()
            } else {
                ord
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Expressions

fn is_true(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}

pub fn eval_expr(expr: &Expr, env: &Env, db: &Database) -> Result<Value, InterpError> {
    match expr {
        Expr::Literal(lit) => Ok(lit.value.clone()),
        Expr::Unary { op, inner } => {
            let value = eval_expr(inner, env, db)?;
            eval_unary(*op, value)
        }
        Expr::Binary { op, lhs, rhs } => {
            let l = eval_expr(lhs, env, db)?;
            let r = eval_expr(rhs, env, db)?;
            eval_binary(*op, l, r)
        }
        Expr::Case {
            subject,
            whens,
            fallback,
        } => eval_case(subject.as_deref(), whens, fallback, env, db),
        Expr::Func { func, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval_expr(arg, env, db)?);
            }
            eval_func(*func, values)
        }
        Expr::Locator { root, path } => eval_locator(root, path, env, db),
        Expr::Sql { .. } => Err(InterpError::RawSqlUnsupported),
        Expr::Terminator { kind, query } => eval_terminator(*kind, query, env, db),
    }
}

fn eval_unary(op: UnaryOp, value: Value) -> Result<Value, InterpError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match (op, value) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, Value::Int(n)) => Ok(Value::Int(-n)),
        (UnaryOp::Neg, Value::Float(n)) => Ok(Value::Float(-n)),
        (UnaryOp::BitNot, Value::Int(n)) => Ok(Value::Int(!n)),
        (UnaryOp::Not, other) => Err(scalar::TypeError::NotBool {
            op: "not".to_string(),
            found: other.infer_type().base,
        }
        .into()),
        (UnaryOp::Neg, other) => Err(scalar::TypeError::NotNumeric {
            op: "-".to_string(),
            found: other.infer_type().base,
        }
        .into()),
        (UnaryOp::BitNot, other) => Err(scalar::TypeError::NotInteger {
            op: "~".to_string(),
            found: other.infer_type().base,
        }
        .into()),
    }
}

/// Render a value the way SQL string concatenation would.
fn text_repr(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        Value::Int(n) => n.to_string(),
        Value::Float(n) if n.fract() == 0.0 && n.is_finite() => format!("{:.1}", n),
        Value::Float(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(_) => String::new(),
    }
}

fn numeric_pair(op: BinaryOp, l: &Value, r: &Value) -> Result<(f64, f64), InterpError> {
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => {
            let found = if l.as_f64().is_none() { l } else { r };
            Err(scalar::TypeError::NotNumeric {
                op: op.symbol().to_string(),
                found: found.infer_type().base,
            }
            .into())
        }
    }
}

fn integer_pair(op: BinaryOp, l: &Value, r: &Value) -> Result<(i64, i64), InterpError> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok((*a, *b)),
        _ => {
            let found = if matches!(l, Value::Int(_)) { r } else { l };
            Err(scalar::TypeError::NotInteger {
                op: op.symbol().to_string(),
                found: found.infer_type().base,
            }
            .into())
        }
    }
}

fn eval_binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, InterpError> {
    match op {
        // Two-valued equality: NULL equals NULL, differs from everything
        BinaryOp::Eq => Ok(Value::Bool(l.total_cmp(&r) == Ordering::Equal)),
        BinaryOp::Ne => Ok(Value::Bool(l.total_cmp(&r) != Ordering::Equal)),
        BinaryOp::And => Ok(kleene_and(&l, &r)),
        BinaryOp::Or => Ok(kleene_or(&l, &r)),
        // Two-valued membership: a NULL operand or NULL-only miss is FALSE
        BinaryOp::In => {
            if l.is_null() {
                return Ok(Value::Bool(false));
            }
            let items = match &r {
                Value::Array(items) => items.as_slice(),
                _ => return Ok(Value::Bool(false)),
            };
            Ok(Value::Bool(items.iter().any(|item| {
                !item.is_null() && l.total_cmp(item) == Ordering::Equal
            })))
        }
        _ if l.is_null() || r.is_null() => Ok(Value::Null),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = l.total_cmp(&r);
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }))
        }
        BinaryOp::Add => {
            if matches!(l, Value::Text(_)) || matches!(r, Value::Text(_)) {
                Ok(Value::Text(format!("{}{}", text_repr(&l), text_repr(&r))))
            } else if let (Value::Int(a), Value::Int(b)) = (&l, &r) {
                Ok(Value::Int(a + b))
            } else {
                let (a, b) = numeric_pair(op, &l, &r)?;
                Ok(Value::Float(a + b))
            }
        }
        BinaryOp::Sub | BinaryOp::Mul => {
            if let (Value::Int(a), Value::Int(b)) = (&l, &r) {
                Ok(Value::Int(if op == BinaryOp::Sub { a - b } else { a * b }))
            } else {
                let (a, b) = numeric_pair(op, &l, &r)?;
                Ok(Value::Float(if op == BinaryOp::Sub { a - b } else { a * b }))
            }
        }
        // Always real division; a zero divisor answers NULL like SQL
        BinaryOp::Div => {
            let (a, b) = numeric_pair(op, &l, &r)?;
            if b == 0.0 {
                Ok(Value::Null)
            } else {
                Ok(Value::Float(a / b))
            }
        }
        BinaryOp::Mod => {
            if let (Value::Int(a), Value::Int(b)) = (&l, &r) {
                if *b == 0 {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Int(a % b))
                }
            } else {
                let (a, b) = numeric_pair(op, &l, &r)?;
                if b == 0.0 {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Float(a % b))
                }
            }
        }
        BinaryOp::Like => match (&l, &r) {
            (Value::Text(text), Value::Text(pattern)) => {
                Ok(Value::Bool(like_match(text, pattern)))
            }
            _ => Err(scalar::TypeError::NotText {
                op: "like".to_string(),
                found: l.infer_type().base,
            }
            .into()),
        },
        BinaryOp::BitAnd => {
            let (a, b) = integer_pair(op, &l, &r)?;
            Ok(Value::Int(a & b))
        }
        BinaryOp::BitOr => {
            let (a, b) = integer_pair(op, &l, &r)?;
            Ok(Value::Int(a | b))
        }
        BinaryOp::BitXor => {
            let (a, b) = integer_pair(op, &l, &r)?;
            Ok(Value::Int(a ^ b))
        }
        BinaryOp::Shl => {
            let (a, b) = integer_pair(op, &l, &r)?;
            Ok(Value::Int(if (0..64).contains(&b) {
                a.wrapping_shl(b as u32)
            } else {
                0
            }))
        }
        BinaryOp::Shr => {
            let (a, b) = integer_pair(op, &l, &r)?;
            Ok(Value::Int(if b < 0 {
                0
            } else {
                a >> b.min(63)
            }))
        }
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::And | BinaryOp::Or | BinaryOp::In => {
            unreachable!("handled above")
        }
    }
}

fn kleene_and(l: &Value, r: &Value) -> Value {
    match (l, r) {
        (Value::Bool(false), _) | (_, Value::Bool(false)) => Value::Bool(false),
        (Value::Null, _) | (_, Value::Null) => Value::Null,
        _ => Value::Bool(true),
    }
}

fn kleene_or(l: &Value, r: &Value) -> Value {
    match (l, r) {
        (Value::Bool(true), _) | (_, Value::Bool(true)) => Value::Bool(true),
        (Value::Null, _) | (_, Value::Null) => Value::Null,
        _ => Value::Bool(false),
    }
}

/// SQL LIKE with `%` and `_`, ASCII case-insensitive.
fn like_match(text: &str, pattern: &str) -> bool {
    fn rec(t: &[u8], p: &[u8]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some(b'%') => (0..=t.len()).any(|i| rec(&t[i..], &p[1..])),
            Some(b'_') => !t.is_empty() && rec(&t[1..], &p[1..]),
            Some(c) => !t.is_empty() && t[0].eq_ignore_ascii_case(c) && rec(&t[1..], &p[1..]),
        }
    }
    rec(text.as_bytes(), pattern.as_bytes())
}

fn eval_case(
    subject: Option<&Expr>,
    whens: &[CaseWhen],
    fallback: &Expr,
    env: &Env,
    db: &Database,
) -> Result<Value, InterpError> {
    match subject {
        Some(subject) => {
            let subject = eval_expr(subject, env, db)?;
            for arm in whens {
                let when = eval_expr(&arm.when, env, db)?;
                // NULL never matches a simple CASE arm
                if !subject.is_null()
                    && !when.is_null()
                    && subject.total_cmp(&when) == Ordering::Equal
                {
                    return eval_expr(&arm.then, env, db);
                }
            }
        }
        None => {
            for arm in whens {
                if is_true(&eval_expr(&arm.when, env, db)?) {
                    return eval_expr(&arm.then, env, db);
                }
            }
        }
    }
    eval_expr(fallback, env, db)
}

fn eval_func(func: ScalarFunc, args: Vec<Value>) -> Result<Value, InterpError> {
    match func {
        ScalarFunc::Lower | ScalarFunc::Upper => match args.into_iter().next() {
            Some(Value::Null) | None => Ok(Value::Null),
            Some(Value::Text(s)) => Ok(Value::Text(if func == ScalarFunc::Lower {
                s.to_lowercase()
            } else {
                s.to_uppercase()
            })),
            Some(other) => Err(scalar::TypeError::NotText {
                op: func.name().to_string(),
                found: other.infer_type().base,
            }
            .into()),
        },
        ScalarFunc::Length => match args.into_iter().next() {
            Some(Value::Null) | None => Ok(Value::Null),
            Some(Value::Text(s)) => Ok(Value::Int(s.chars().count() as i64)),
            Some(other) => Err(scalar::TypeError::NotText {
                op: "length".to_string(),
                found: other.infer_type().base,
            }
            .into()),
        },
        ScalarFunc::Concat => {
            if args.iter().any(Value::is_null) {
                return Ok(Value::Null);
            }
            Ok(Value::Text(args.iter().map(text_repr).collect()))
        }
        ScalarFunc::Coalesce => Ok(args
            .into_iter()
            .find(|v| !v.is_null())
            .unwrap_or(Value::Null)),
        ScalarFunc::Abs => match args.into_iter().next() {
            Some(Value::Null) | None => Ok(Value::Null),
            Some(Value::Int(n)) => Ok(Value::Int(n.abs())),
            Some(Value::Float(n)) => Ok(Value::Float(n.abs())),
            Some(other) => Err(scalar::TypeError::NotNumeric {
                op: "abs".to_string(),
                found: other.infer_type().base,
            }
            .into()),
        },
        ScalarFunc::Count
        | ScalarFunc::Sum
        | ScalarFunc::Avg
        | ScalarFunc::Min
        | ScalarFunc::Max => Err(InterpError::AggregateUnsupported { func: func.name() }),
    }
}

// ---------------------------------------------------------------------------
// Locators

fn eval_locator(
    root: &QuerySource,
    path: &[String],
    env: &Env,
    db: &Database,
) -> Result<Value, InterpError> {
    let row = env.get(&root.id()).ok_or(InterpError::UnboundSource)?;
    match root.kind() {
        SourceKind::Table { catalog, table } => resolve_in_table(catalog, *table, row, path, db),
        SourceKind::View { .. } => Err(InterpError::RawSqlUnsupported),
        SourceKind::Query(q) => resolve_in_projection(&q.projection, row, path, db),
    }
}

fn resolve_in_projection(
    projection: &Projection,
    row: &Row,
    path: &[String],
    db: &Database,
) -> Result<Value, InterpError> {
    match projection {
        Projection::Scalar { .. } => {
            if path.is_empty() {
                Ok(row.get(names::SCALAR_COLUMN).cloned().unwrap_or(Value::Null))
            } else {
                Err(scalar::TypeError::UnknownProp {
                    name: path[0].clone(),
                }
                .into())
            }
        }
        Projection::Object { catalog, .. } => match projection.lookup(path) {
            // A missing alias means a NULL-extended outer-join row
            Lookup::Prop(prop) => Ok(row.get(&prop.alias()).cloned().unwrap_or(Value::Null)),
            Lookup::Ref { r, rest } => follow_ref(catalog, r, row, rest, db),
            Lookup::NotFound => Err(scalar::TypeError::UnknownProp {
                name: path.first().cloned().unwrap_or_default(),
            }
            .into()),
        },
    }
}

fn resolve_in_table(
    catalog: &algebra::Catalog,
    table: TableId,
    row: &Row,
    path: &[String],
    db: &Database,
) -> Result<Value, InterpError> {
    let schema = &catalog.table_def(table).schema;
    let first = path
        .first()
        .ok_or(scalar::TypeError::ScalarQueryRequired)?;
    if schema.field(first).is_some() {
        if path.len() == 1 {
            Ok(row.get(first).cloned().unwrap_or(Value::Null))
        } else {
            Err(scalar::TypeError::UnknownProp {
                name: path[1].clone(),
            }
            .into())
        }
    } else if let Some(r) = schema.ref_by_name(first) {
        follow_ref(catalog, r, row, &path[1..], db)
    } else {
        Err(scalar::TypeError::UnknownProp {
            name: first.clone(),
        }
        .into())
    }
}

/// Walk a forward ref from the current row: look up the single related row
/// by the ref condition and keep resolving there. A NULL local key or a
/// missing related row yields NULL, matching LEFT-join semantics.
fn follow_ref(
    catalog: &algebra::Catalog,
    r: &Ref,
    row: &Row,
    rest: &[String],
    db: &Database,
) -> Result<Value, InterpError> {
    let (target, on) = match r {
        Ref::Forward { target, on, .. } => (*target, on),
        Ref::Back { name, .. } => {
            return Err(scalar::TypeError::BackRefInExpr { name: name.clone() }.into())
        }
    };
    let mut keys = Vec::with_capacity(on.pairs.len());
    for (local, _) in &on.pairs {
        let value = row.get(local).cloned().unwrap_or(Value::Null);
        if value.is_null() {
            return Ok(Value::Null);
        }
        keys.push(value);
    }
    let related = db.rows(target).iter().find(|candidate| {
        on.pairs.iter().zip(&keys).all(|((_, foreign), key)| {
            candidate
                .get(foreign)
                .is_some_and(|v| v.total_cmp(key) == Ordering::Equal)
        })
    });
    match related {
        Some(related) => {
            let related = related.clone();
            resolve_in_table(catalog, target, &related, rest, db)
        }
        None => Ok(Value::Null),
    }
}

// ---------------------------------------------------------------------------
// Terminators

fn eval_terminator(
    kind: TerminatorKind,
    query: &Query,
    env: &Env,
    db: &Database,
) -> Result<Value, InterpError> {
    let rows = eval_query(query, env, db)?;
    match kind {
        TerminatorKind::Size => Ok(Value::Int(rows.len() as i64)),
        TerminatorKind::Some => Ok(Value::Bool(!rows.is_empty())),
        TerminatorKind::Empty => Ok(Value::Bool(rows.is_empty())),
        TerminatorKind::First => Ok(rows
            .first()
            .and_then(|row| row.get(names::SCALAR_COLUMN).cloned())
            .unwrap_or(Value::Null)),
        TerminatorKind::Max | TerminatorKind::Min => {
            let values = scalar_values(&rows);
            Ok(values
                .into_iter()
                .reduce(|a, b| {
                    let keep_a = if kind == TerminatorKind::Max {
                        a.total_cmp(&b) != Ordering::Less
                    } else {
                        a.total_cmp(&b) != Ordering::Greater
                    };
                    if keep_a {
                        a
                    } else {
                        b
                    }
                })
                .unwrap_or(Value::Null))
        }
        TerminatorKind::Sum => {
            let values = scalar_values(&rows);
            if values.is_empty() {
                return Ok(Value::Null);
            }
            sum_values(&values)
        }
        // Defined as sum/count over non-null rows, not a dialect AVG alias
        TerminatorKind::Mean => {
            let values = scalar_values(&rows);
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let mut total = 0.0;
            for value in &values {
                total += value
                    .as_f64()
                    .ok_or_else(|| InterpError::NonNumericAggregate {
                        found: value.clone(),
                    })?;
            }
            Ok(Value::Float(total / values.len() as f64))
        }
    }
}

/// Non-null values of the scalar column, in row order.
fn scalar_values(rows: &[Row]) -> Vec<Value> {
    rows.iter()
        .filter_map(|row| row.get(names::SCALAR_COLUMN))
        .filter(|v| !v.is_null())
        .cloned()
        .collect()
}

fn sum_values(values: &[Value]) -> Result<Value, InterpError> {
    if values.iter().all(|v| matches!(v, Value::Int(_))) {
        let mut total = 0i64;
        for value in values {
            if let Value::Int(n) = value {
                total += n;
            }
        }
        return Ok(Value::Int(total));
    }
    let mut total = 0.0;
    for value in values {
        total += value
            .as_f64()
            .ok_or_else(|| InterpError::NonNumericAggregate {
                found: value.clone(),
            })?;
    }
    Ok(Value::Float(total))
}
