//! The lowering itself
//!
//! Every operator node compiles to one SELECT over its compiled source;
//! subqueries nest freely and the optimizer flattens them afterwards.
//! Three mechanisms carry the algebra's semantics across the boundary:
//!
//! * relationship walks emit joins that float in the context until the
//!   SELECT owning their root alias attaches them,
//! * ORDER BY survives subquery nesting through `$sys$ord$N` helper
//!   columns that each wrapping SELECT re-applies,
//! * two-valued booleans are restored from SQL's three-valued logic by
//!   null-safe equality expansion and COALESCE(..., FALSE) at predicate
//!   boundaries.

use algebra::projection::Lookup;
use algebra::{
    names, BinaryOp, Catalog, CombineKind, Expr, JoinKind, NullsOrder, Projection, Query, QueryOp,
    QuerySource, Ref, Schema, SourceKind, TerminatorKind, UnaryOp,
};
use scalar::{Literal, TypeError};
use sqltree::{
    CastType, CombinationKind, Select, SelectColumn, SqlBinaryOp, SqlExpr, SqlFunc, SqlJoin,
    SqlJoinKind, SqlNulls, SqlOrderBy, SqlQuery, SqlSource, SqlUnaryOp,
};

use crate::context::Context;
use crate::error::CompileError;

/// LIMIT stand-in when only an OFFSET is requested; SQLite and MySQL
/// refuse OFFSET without a LIMIT clause.
pub const UNBOUNDED_LIMIT: u64 = 1 << 62;

/// Compile a query to the neutral SQL tree.
pub fn compile(query: &Query) -> Result<SqlQuery, CompileError> {
    let mut ctx = Context::new();
    let sql = compile_query(&mut ctx, query)?;
    let pending = ctx.pending_aliases();
    if !pending.is_empty() {
        let partial_sql = sqltree::render(
            &sql,
            &sqltree::SqliteDialect,
            &sqltree::RenderOptions {
                parameterized: false,
            },
        )
        .sql;
        return Err(CompileError::OrphanedJoins {
            aliases: pending,
            partial_sql,
        });
    }
    tracing::debug!(?sql, "compiled query");
    Ok(sql)
}

fn compile_query(ctx: &mut Context, q: &Query) -> Result<SqlQuery, CompileError> {
    if let QueryOp::Combine { kind, other } = &q.op {
        return compile_combine(ctx, q, *kind, other);
    }

    let (from, inherited) = compile_source(ctx, &q.source)?;
    let mut select = Select::new(Some(from));
    let allow_aggregate = matches!(&q.op, QueryOp::GroupBy { .. });

    match &q.op {
        QueryOp::Proxy | QueryOp::Map => {
            select.order_by = inherited;
        }
        QueryOp::Filter { predicate } => {
            select.where_clause = Some(compile_predicate(ctx, predicate, false)?);
            select.order_by = inherited;
        }
        QueryOp::OrderBy { terms } => {
            // New keys first, the source's propagated order as tie-break:
            // re-ordering behaves like a stable sort
            let mut own = Vec::with_capacity(terms.len() + inherited.len());
            for term in terms {
                own.push(SqlOrderBy {
                    expr: compile_expr(ctx, &term.expr, false)?,
                    desc: term.desc,
                    nulls: map_nulls(term.nulls),
                });
            }
            own.extend(inherited);
            select.order_by = own;
        }
        QueryOp::GroupBy { by, having } => {
            for key in by {
                select.group_by.push(compile_expr(ctx, key, false)?);
            }
            if let Some(having) = having {
                select.having = Some(compile_predicate(ctx, having, true)?);
            }
            // aggregation discards any propagated order
        }
        QueryOp::Join {
            kind,
            right,
            on,
            lateral,
        } => {
            let (right_source, right_inherited) = compile_source(ctx, right)?;
            let on_sql = match on {
                Some(on) => Some(compile_predicate(ctx, on, false)?),
                None => None,
            };
            // Relationship joins rooted on the left side must precede the
            // explicit join so its ON condition can reference them
            attach_joins(ctx, &mut select);
            select.joins.push(SqlJoin {
                kind: map_join(*kind),
                source: right_source,
                on: on_sql,
                lateral: *lateral,
            });
            let mut order = inherited;
            order.extend(right_inherited);
            select.order_by = order;
        }
        QueryOp::Unique => {
            // DISTINCT dedups over the projected columns only, so the
            // propagated order (and its helper columns) is dropped
            select.distinct = true;
        }
        QueryOp::Paginate { limit, offset } => {
            select.limit = match (limit, offset) {
                (Some(limit), _) => Some(*limit),
                (None, Some(_)) => Some(UNBOUNDED_LIMIT),
                (None, None) => None,
            };
            select.offset = *offset;
            select.order_by = inherited;
        }
        QueryOp::Combine { .. } => unreachable!("combine handled above"),
    }

    compile_projection(ctx, &q.projection, &mut select, allow_aggregate)?;
    finalize_select(ctx, &mut select);
    Ok(SqlQuery::select(select))
}

fn compile_projection(
    ctx: &mut Context,
    projection: &Projection,
    select: &mut Select,
    allow_aggregate: bool,
) -> Result<(), CompileError> {
    let mut columns = Vec::new();
    match projection {
        Projection::Scalar { expr } => {
            columns.push(SelectColumn::new(
                compile_expr(ctx, expr, allow_aggregate)?,
                names::SCALAR_COLUMN,
            ));
        }
        Projection::Object { props, .. } => {
            for prop in props {
                columns.push(SelectColumn::new(
                    compile_expr(ctx, &prop.expr, allow_aggregate)?,
                    prop.alias(),
                ));
            }
        }
    }
    // projection columns precede any helper columns added later
    columns.extend(select.columns.drain(..));
    select.columns = columns;
    Ok(())
}

fn compile_source(
    ctx: &mut Context,
    source: &QuerySource,
) -> Result<(SqlSource, Vec<SqlOrderBy>), CompileError> {
    let alias = ctx.alias_for(source.id());
    match source.kind() {
        SourceKind::Table { catalog, table } => Ok((
            SqlSource::Table {
                name: catalog.table_def(*table).name.clone(),
                alias,
            },
            Vec::new(),
        )),
        SourceKind::View { template, .. } => Ok((
            SqlSource::Raw {
                fragments: template.fragments.clone(),
                args: Vec::new(),
                alias,
            },
            Vec::new(),
        )),
        SourceKind::Query(inner) => {
            let sql = compile_query(ctx, inner)?;
            let inherited = inherited_order(&sql, &alias);
            Ok((
                SqlSource::Subquery {
                    query: Box::new(sql),
                    alias,
                },
                inherited,
            ))
        }
    }
}

/// Ordering terms a wrapping SELECT must re-apply: one per helper column
/// the compiled subquery emitted, with the original direction.
fn inherited_order(sql: &SqlQuery, alias: &str) -> Vec<SqlOrderBy> {
    match sql {
        SqlQuery::Select(select) => select
            .order_by
            .iter()
            .enumerate()
            .map(|(i, term)| SqlOrderBy {
                expr: SqlExpr::column(alias, names::ordering_column(i)),
                desc: term.desc,
                nulls: term.nulls,
            })
            .collect(),
        SqlQuery::Combination(_) => Vec::new(),
    }
}

/// Attach pending relationship joins reachable from this SELECT's scope,
/// following chains (a join hanging off another pending join).
fn attach_joins(ctx: &mut Context, select: &mut Select) {
    let mut visible: Vec<String> = Vec::new();
    if let Some(from) = &select.from {
        visible.push(from.alias().to_string());
    }
    for join in &select.joins {
        visible.push(join.source.alias().to_string());
    }
    loop {
        let drained = ctx.take_rooted(&visible);
        if drained.is_empty() {
            break;
        }
        for join in drained {
            visible.push(join.source.alias().to_string());
            select.joins.push(join);
        }
    }
}

fn finalize_select(ctx: &mut Context, select: &mut Select) {
    attach_joins(ctx, select);
    if !select.order_by.is_empty() {
        let helpers: Vec<SelectColumn> = select
            .order_by
            .iter()
            .enumerate()
            .map(|(i, term)| SelectColumn::new(term.expr.clone(), names::ordering_column(i)))
            .collect();
        select.columns.extend(helpers);
    }
}

// ---------------------------------------------------------------------------
// Combinations

fn compile_combine(
    ctx: &mut Context,
    q: &Query,
    kind: CombineKind,
    other: &Query,
) -> Result<SqlQuery, CompileError> {
    let left_sql = compile_operand(ctx, &q.source)?;
    let right_sql = compile_query(ctx, other)?;

    let expected = output_aliases(&left_sql);
    let got = output_aliases(&right_sql);
    let mut expected_sorted = expected.clone();
    let mut got_sorted = got.clone();
    expected_sorted.sort();
    got_sorted.sort();
    if expected_sorted != got_sorted {
        return Err(CompileError::CombineShapeMismatch {
            left: expected,
            right: got,
        });
    }

    let combined = match kind {
        CombineKind::Concat => {
            let left = concat_operand(ctx, left_sql, &expected, 0);
            let right = concat_operand(ctx, right_sql, &expected, 1);
            SqlQuery::combination(CombinationKind::UnionAll, left, right)
        }
        _ => {
            let left = strip_ordering(ctx, left_sql);
            let mut right = strip_ordering(ctx, right_sql);
            reorder_columns(&mut right, &expected)?;
            SqlQuery::combination(map_combine(kind), left, right)
        }
    };

    let alias = ctx.alias_for(q.source.id());
    let mut select = Select::new(Some(SqlSource::Subquery {
        query: Box::new(combined),
        alias: alias.clone(),
    }));
    if kind == CombineKind::Concat {
        // side tag first, per-side row number second: left rows precede
        // right rows, each side in its own order
        select.order_by = vec![
            SqlOrderBy::asc(SqlExpr::column(alias.clone(), names::ordering_column(0))),
            SqlOrderBy::asc(SqlExpr::column(alias, names::ordering_column(1))),
        ];
    }
    compile_projection(ctx, &q.projection, &mut select, false)?;
    finalize_select(ctx, &mut select);
    Ok(SqlQuery::select(select))
}

/// Compile a combination operand. The usual case is a wrapped query; a
/// bare table or view source compiles to a plain select over it.
fn compile_operand(ctx: &mut Context, source: &QuerySource) -> Result<SqlQuery, CompileError> {
    if let SourceKind::Query(inner) = source.kind() {
        return compile_query(ctx, inner);
    }
    let (from, _) = compile_source(ctx, source)?;
    let mut select = Select::new(Some(from));
    compile_projection(ctx, &source.projection(), &mut select, false)?;
    finalize_select(ctx, &mut select);
    Ok(SqlQuery::select(select))
}

/// Output aliases of a compiled query, helper columns excluded.
fn output_aliases(sql: &SqlQuery) -> Vec<String> {
    match sql {
        SqlQuery::Select(select) => select
            .columns
            .iter()
            .filter(|c| !names::is_ordering_column(&c.alias))
            .map(|c| c.alias.clone())
            .collect(),
        SqlQuery::Combination(c) => output_aliases(&c.left),
    }
}

/// Drop ordering helpers from a set-combination operand; the combination
/// defines no row order, and operand column sets must line up exactly. A
/// paginated operand keeps its ordering inside a wrapping scope so LIMIT
/// still picks the right rows.
fn strip_ordering(ctx: &mut Context, sql: SqlQuery) -> SqlQuery {
    match sql {
        SqlQuery::Select(mut select) => {
            if (select.limit.is_some() || select.offset.is_some()) && !select.order_by.is_empty() {
                let alias = ctx.fresh_alias();
                let columns: Vec<SelectColumn> = select
                    .columns
                    .iter()
                    .filter(|c| !names::is_ordering_column(&c.alias))
                    .map(|c| {
                        SelectColumn::new(
                            SqlExpr::column(alias.clone(), c.alias.clone()),
                            c.alias.clone(),
                        )
                    })
                    .collect();
                let mut outer = Select::new(Some(SqlSource::Subquery {
                    query: Box::new(SqlQuery::Select(select)),
                    alias,
                }));
                outer.columns = columns;
                SqlQuery::select(outer)
            } else {
                select
                    .columns
                    .retain(|c| !names::is_ordering_column(&c.alias));
                select.order_by.clear();
                SqlQuery::Select(select)
            }
        }
        SqlQuery::Combination(mut c) => {
            c.left = strip_ordering(ctx, c.left);
            c.right = strip_ordering(ctx, c.right);
            SqlQuery::Combination(c)
        }
    }
}

fn reorder_columns(sql: &mut SqlQuery, expected: &[String]) -> Result<(), CompileError> {
    match sql {
        SqlQuery::Select(select) => {
            let mut columns = Vec::with_capacity(expected.len());
            for name in expected {
                match select.columns.iter().find(|c| &c.alias == name) {
                    Some(col) => columns.push(col.clone()),
                    None => {
                        return Err(CompileError::CombineShapeMismatch {
                            left: expected.to_vec(),
                            right: select.columns.iter().map(|c| c.alias.clone()).collect(),
                        })
                    }
                }
            }
            select.columns = columns;
            Ok(())
        }
        SqlQuery::Combination(c) => {
            reorder_columns(&mut c.left, expected)?;
            reorder_columns(&mut c.right, expected)
        }
    }
}

/// Wrap a concat operand: project the shared columns, tag the side, and
/// number the rows in the operand's propagated order.
fn concat_operand(ctx: &mut Context, sql: SqlQuery, expected: &[String], tag: i64) -> SqlQuery {
    let alias = ctx.fresh_alias();
    let inherited = inherited_order(&sql, &alias);
    let mut outer = Select::new(Some(SqlSource::Subquery {
        query: Box::new(sql),
        alias: alias.clone(),
    }));
    for name in expected {
        outer.columns.push(SelectColumn::new(
            SqlExpr::column(alias.clone(), name.clone()),
            name.clone(),
        ));
    }
    outer.columns.push(SelectColumn::new(
        SqlExpr::lit_inline(Literal::i64(tag)),
        names::ordering_column(0),
    ));
    outer.columns.push(SelectColumn::new(
        SqlExpr::RowNumber {
            order_by: inherited,
        },
        names::ordering_column(1),
    ));
    SqlQuery::select(outer)
}

// ---------------------------------------------------------------------------
// Expressions

/// A predicate position restores two-valued logic: a nullable boolean is
/// collapsed with COALESCE(..., FALSE).
fn compile_predicate(
    ctx: &mut Context,
    expr: &Expr,
    allow_aggregate: bool,
) -> Result<SqlExpr, CompileError> {
    let ty = expr.scalar_type()?;
    let sql = compile_expr(ctx, expr, allow_aggregate)?;
    Ok(if ty.nullable {
        SqlExpr::coalesce_false(sql)
    } else {
        sql
    })
}

fn compile_expr(
    ctx: &mut Context,
    expr: &Expr,
    allow_aggregate: bool,
) -> Result<SqlExpr, CompileError> {
    match expr {
        Expr::Literal(lit) => Ok(SqlExpr::lit(lit.clone())),
        Expr::Unary { op, inner } => {
            let inner = compile_expr(ctx, inner, allow_aggregate)?;
            let op = match op {
                UnaryOp::Not => SqlUnaryOp::Not,
                UnaryOp::Neg => SqlUnaryOp::Neg,
                UnaryOp::BitNot => SqlUnaryOp::BitNot,
            };
            Ok(SqlExpr::Unary {
                op,
                inner: Box::new(inner),
            })
        }
        Expr::Binary { op, lhs, rhs } => compile_binary(ctx, *op, lhs, rhs, allow_aggregate),
        Expr::Case {
            subject,
            whens,
            fallback,
        } => {
            let subject = match subject {
                Some(subject) => Some(Box::new(compile_expr(ctx, subject, allow_aggregate)?)),
                None => None,
            };
            let mut arms = Vec::with_capacity(whens.len());
            for arm in whens {
                arms.push((
                    compile_expr(ctx, &arm.when, allow_aggregate)?,
                    compile_expr(ctx, &arm.then, allow_aggregate)?,
                ));
            }
            Ok(SqlExpr::Case {
                subject,
                whens: arms,
                fallback: Box::new(compile_expr(ctx, fallback, allow_aggregate)?),
            })
        }
        Expr::Func { func, args } => {
            if func.is_aggregate() && !allow_aggregate {
                return Err(CompileError::AggregateNotAllowed { func: func.name() });
            }
            // aggregates do not nest
            let inner_allow = allow_aggregate && !func.is_aggregate();
            let mut sql_args = Vec::with_capacity(args.len());
            for arg in args {
                sql_args.push(compile_expr(ctx, arg, inner_allow)?);
            }
            Ok(SqlExpr::Func {
                func: map_func(*func),
                args: sql_args,
            })
        }
        Expr::Locator { root, path } => compile_locator(ctx, root, path),
        Expr::Sql { template, args, .. } => {
            let mut sql_args = Vec::with_capacity(args.len());
            for arg in args {
                sql_args.push(compile_expr(ctx, arg, allow_aggregate)?);
            }
            Ok(SqlExpr::Raw {
                fragments: template.fragments.clone(),
                args: sql_args,
            })
        }
        Expr::Terminator { kind, query } => compile_terminator(ctx, *kind, query),
    }
}

fn compile_binary(
    ctx: &mut Context,
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    allow_aggregate: bool,
) -> Result<SqlExpr, CompileError> {
    match op {
        BinaryOp::Eq | BinaryOp::Ne => {
            let nullable = lhs.scalar_type()?.nullable || rhs.scalar_type()?.nullable;
            let l = compile_expr(ctx, lhs, allow_aggregate)?;
            let r = compile_expr(ctx, rhs, allow_aggregate)?;
            if !nullable {
                let op = if op == BinaryOp::Eq {
                    SqlBinaryOp::Eq
                } else {
                    SqlBinaryOp::Ne
                };
                return Ok(SqlExpr::binary(op, l, r));
            }
            // Null-safe equality: NULL equals NULL and differs from every
            // value, unlike SQL's three-valued `=`
            let expanded = if op == BinaryOp::Eq {
                SqlExpr::or(
                    SqlExpr::and(SqlExpr::is_null(l.clone()), SqlExpr::is_null(r.clone())),
                    SqlExpr::binary(SqlBinaryOp::Eq, l, r),
                )
            } else {
                SqlExpr::or(
                    SqlExpr::or(
                        SqlExpr::and(SqlExpr::is_null(l.clone()), SqlExpr::is_not_null(r.clone())),
                        SqlExpr::and(SqlExpr::is_not_null(l.clone()), SqlExpr::is_null(r.clone())),
                    ),
                    SqlExpr::binary(SqlBinaryOp::Ne, l, r),
                )
            };
            Ok(SqlExpr::coalesce_false(expanded))
        }
        BinaryOp::Add => {
            let text = lhs.scalar_type()?.base.is_text() || rhs.scalar_type()?.base.is_text();
            let l = compile_expr(ctx, lhs, allow_aggregate)?;
            let r = compile_expr(ctx, rhs, allow_aggregate)?;
            let op = if text {
                SqlBinaryOp::Concat
            } else {
                SqlBinaryOp::Add
            };
            Ok(SqlExpr::binary(op, l, r))
        }
        BinaryOp::Div => {
            // float division regardless of operand types; SQLite and
            // PostgreSQL divide integers integrally
            let l = compile_expr(ctx, lhs, allow_aggregate)?;
            let r = compile_expr(ctx, rhs, allow_aggregate)?;
            Ok(SqlExpr::binary(
                SqlBinaryOp::Div,
                SqlExpr::Cast {
                    expr: Box::new(l),
                    to: CastType::Float,
                },
                r,
            ))
        }
        BinaryOp::In => {
            // Membership is two-valued: a NULL operand or a NULL-only miss
            // answers FALSE, never NULL
            let nullable = lhs.scalar_type()?.nullable || rhs.scalar_type()?.nullable;
            let l = compile_expr(ctx, lhs, allow_aggregate)?;
            let r = compile_expr(ctx, rhs, allow_aggregate)?;
            let membership = SqlExpr::binary(SqlBinaryOp::In, l, r);
            if nullable {
                Ok(SqlExpr::coalesce_false(membership))
            } else {
                Ok(membership)
            }
        }
        _ => {
            let l = compile_expr(ctx, lhs, allow_aggregate)?;
            let r = compile_expr(ctx, rhs, allow_aggregate)?;
            Ok(SqlExpr::binary(map_binary(op), l, r))
        }
    }
}

fn compile_locator(
    ctx: &mut Context,
    root: &QuerySource,
    path: &[String],
) -> Result<SqlExpr, CompileError> {
    let alias = ctx.alias_for(root.id());
    match root.kind() {
        SourceKind::Table { catalog, table } => {
            let schema = &catalog.table_def(*table).schema;
            locate_in_schema(ctx, catalog, schema, alias, path)
        }
        SourceKind::View {
            catalog, schema, ..
        } => locate_in_schema(ctx, catalog, schema, alias, path),
        SourceKind::Query(inner) => match &inner.projection {
            Projection::Scalar { .. } => {
                if path.is_empty() {
                    Ok(SqlExpr::column(alias, names::SCALAR_COLUMN))
                } else {
                    Err(TypeError::UnknownProp {
                        name: path[0].clone(),
                    }
                    .into())
                }
            }
            Projection::Object { catalog, .. } => match inner.projection.lookup(path) {
                Lookup::Prop(prop) => Ok(SqlExpr::column(alias, prop.alias())),
                Lookup::Ref { r, rest } => join_through(ctx, catalog, &alias, r, rest),
                Lookup::NotFound => Err(TypeError::UnknownProp {
                    name: path.first().cloned().unwrap_or_default(),
                }
                .into()),
            },
        },
    }
}

fn locate_in_schema(
    ctx: &mut Context,
    catalog: &Catalog,
    schema: &Schema,
    alias: String,
    path: &[String],
) -> Result<SqlExpr, CompileError> {
    let first = path.first().ok_or(TypeError::ScalarQueryRequired)?;
    if schema.field(first).is_some() {
        if path.len() == 1 {
            Ok(SqlExpr::column(alias, first.clone()))
        } else {
            Err(TypeError::UnknownProp {
                name: path[1].clone(),
            }
            .into())
        }
    } else if let Some(r) = schema.ref_by_name(first) {
        join_through(ctx, catalog, &alias, r, &path[1..])
    } else {
        Err(TypeError::UnknownProp {
            name: first.clone(),
        }
        .into())
    }
}

/// Walk a forward relationship: reuse or create the join for this hop,
/// then resolve the rest of the path in the target table.
fn join_through(
    ctx: &mut Context,
    catalog: &Catalog,
    left_alias: &str,
    r: &Ref,
    rest: &[String],
) -> Result<SqlExpr, CompileError> {
    let (target, on, nullable) = match r {
        Ref::Forward {
            target,
            on,
            nullable,
            ..
        } => (*target, on, *nullable),
        Ref::Back { name, .. } => {
            return Err(TypeError::BackRefInExpr { name: name.clone() }.into())
        }
    };
    let join_alias = match ctx.ref_join(left_alias, r.name()) {
        Some(existing) => existing,
        None => {
            let join_alias = ctx.fresh_alias();
            let def = catalog.table_def(target);
            let mut condition: Option<SqlExpr> = None;
            for (local, foreign) in &on.pairs {
                let pair = SqlExpr::binary(
                    SqlBinaryOp::Eq,
                    SqlExpr::column(join_alias.clone(), foreign.clone()),
                    SqlExpr::column(left_alias, local.clone()),
                );
                condition = Some(match condition {
                    None => pair,
                    Some(c) => SqlExpr::and(c, pair),
                });
            }
            // Once a hop is LEFT, everything behind it stays LEFT so a
            // NULL chain yields NULL instead of dropping the row
            let left_chain = nullable || ctx.is_left_joined(left_alias);
            let kind = if left_chain {
                SqlJoinKind::Left
            } else {
                SqlJoinKind::Inner
            };
            if left_chain {
                ctx.mark_left_joined(&join_alias);
            }
            ctx.push_loose(
                left_alias.to_string(),
                SqlJoin {
                    kind,
                    source: SqlSource::Table {
                        name: def.name.clone(),
                        alias: join_alias.clone(),
                    },
                    on: condition,
                    lateral: false,
                },
            );
            ctx.register_ref_join(left_alias, r.name(), join_alias.clone());
            join_alias
        }
    };
    let target_schema = &catalog.table_def(target).schema;
    locate_in_schema(ctx, catalog, target_schema, join_alias, rest)
}

fn compile_terminator(
    ctx: &mut Context,
    kind: TerminatorKind,
    query: &Query,
) -> Result<SqlExpr, CompileError> {
    match kind {
        TerminatorKind::Some | TerminatorKind::Empty => {
            let inner = compile_query(ctx, query)?;
            Ok(SqlExpr::Exists {
                query: Box::new(inner),
                negated: kind == TerminatorKind::Empty,
            })
        }
        TerminatorKind::Size => {
            let inner = compile_query(ctx, query)?;
            let alias = ctx.fresh_alias();
            let mut select = Select::new(Some(SqlSource::Subquery {
                query: Box::new(inner),
                alias,
            }));
            select
                .columns
                .push(SelectColumn::new(SqlExpr::CountAll, names::SCALAR_COLUMN));
            Ok(SqlExpr::Subquery(Box::new(SqlQuery::select(select))))
        }
        TerminatorKind::First => {
            if !query.projection.is_scalar() {
                return Err(TypeError::ScalarQueryRequired.into());
            }
            let inner = compile_query(ctx, query)?;
            let alias = ctx.fresh_alias();
            let inherited = inherited_order(&inner, &alias);
            let mut select = Select::new(Some(SqlSource::Subquery {
                query: Box::new(inner),
                alias: alias.clone(),
            }));
            select.columns.push(SelectColumn::new(
                SqlExpr::column(alias, names::SCALAR_COLUMN),
                names::SCALAR_COLUMN,
            ));
            select.order_by = inherited;
            select.limit = Some(1);
            Ok(SqlExpr::Subquery(Box::new(SqlQuery::select(select))))
        }
        TerminatorKind::Max | TerminatorKind::Min | TerminatorKind::Sum | TerminatorKind::Mean => {
            if !query.projection.is_scalar() {
                return Err(TypeError::ScalarQueryRequired.into());
            }
            let inner = compile_query(ctx, query)?;
            let alias = ctx.fresh_alias();
            let func = match kind {
                TerminatorKind::Max => SqlFunc::Max,
                TerminatorKind::Min => SqlFunc::Min,
                TerminatorKind::Sum => SqlFunc::Sum,
                // mean is sum over count of the non-null rows, which is
                // exactly SQL's AVG
                _ => SqlFunc::Avg,
            };
            let mut select = Select::new(Some(SqlSource::Subquery {
                query: Box::new(inner),
                alias: alias.clone(),
            }));
            select.columns.push(SelectColumn::new(
                SqlExpr::Func {
                    func,
                    args: vec![SqlExpr::column(alias, names::SCALAR_COLUMN)],
                },
                names::SCALAR_COLUMN,
            ));
            Ok(SqlExpr::Subquery(Box::new(SqlQuery::select(select))))
        }
    }
}

// ---------------------------------------------------------------------------
// Enum mappings

fn map_binary(op: BinaryOp) -> SqlBinaryOp {
    match op {
        BinaryOp::Add => SqlBinaryOp::Add,
        BinaryOp::Sub => SqlBinaryOp::Sub,
        BinaryOp::Mul => SqlBinaryOp::Mul,
        BinaryOp::Div => SqlBinaryOp::Div,
        BinaryOp::Mod => SqlBinaryOp::Mod,
        BinaryOp::Eq => SqlBinaryOp::Eq,
        BinaryOp::Ne => SqlBinaryOp::Ne,
        BinaryOp::Lt => SqlBinaryOp::Lt,
        BinaryOp::Le => SqlBinaryOp::Le,
        BinaryOp::Gt => SqlBinaryOp::Gt,
        BinaryOp::Ge => SqlBinaryOp::Ge,
        BinaryOp::And => SqlBinaryOp::And,
        BinaryOp::Or => SqlBinaryOp::Or,
        BinaryOp::Like => SqlBinaryOp::Like,
        BinaryOp::In => SqlBinaryOp::In,
        BinaryOp::BitAnd => SqlBinaryOp::BitAnd,
        BinaryOp::BitOr => SqlBinaryOp::BitOr,
        BinaryOp::BitXor => SqlBinaryOp::BitXor,
        BinaryOp::Shl => SqlBinaryOp::Shl,
        BinaryOp::Shr => SqlBinaryOp::Shr,
    }
}

fn map_func(func: algebra::ScalarFunc) -> SqlFunc {
    use algebra::ScalarFunc;
    match func {
        ScalarFunc::Lower => SqlFunc::Lower,
        ScalarFunc::Upper => SqlFunc::Upper,
        ScalarFunc::Length => SqlFunc::Length,
        ScalarFunc::Concat => SqlFunc::Concat,
        ScalarFunc::Coalesce => SqlFunc::Coalesce,
        ScalarFunc::Abs => SqlFunc::Abs,
        ScalarFunc::Count => SqlFunc::Count,
        ScalarFunc::Sum => SqlFunc::Sum,
        ScalarFunc::Avg => SqlFunc::Avg,
        ScalarFunc::Min => SqlFunc::Min,
        ScalarFunc::Max => SqlFunc::Max,
    }
}

fn map_join(kind: JoinKind) -> SqlJoinKind {
    match kind {
        JoinKind::Inner => SqlJoinKind::Inner,
        JoinKind::Left => SqlJoinKind::Left,
        JoinKind::Right => SqlJoinKind::Right,
        JoinKind::Full => SqlJoinKind::Full,
    }
}

fn map_nulls(nulls: NullsOrder) -> SqlNulls {
    match nulls {
        NullsOrder::Default => SqlNulls::Default,
        NullsOrder::First => SqlNulls::First,
        NullsOrder::Last => SqlNulls::Last,
    }
}

fn map_combine(kind: CombineKind) -> CombinationKind {
    match kind {
        CombineKind::Union => CombinationKind::Union,
        CombineKind::UnionAll => CombinationKind::UnionAll,
        CombineKind::Intersect => CombinationKind::Intersect,
        CombineKind::Except => CombinationKind::Except,
        CombineKind::Concat => CombinationKind::UnionAll,
    }
}
