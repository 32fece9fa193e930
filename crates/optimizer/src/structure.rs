//! Structural rewrites over the SQL tree: SELECT-into-SELECT merging,
//! hoisting join-position subqueries into the enclosing FROM scope, and
//! dropping LATERAL from joins that never correlate.

use std::collections::{HashMap, HashSet};

use algebra::names;
use sqltree::{
    Combination, Select, SelectColumn, SqlExpr, SqlJoin, SqlJoinKind, SqlQuery, SqlSource,
};

use crate::expr::simplify_expr;

/// Column substitution: what to put in place of `alias.column`.
type Lookup<'a> = &'a dyn Fn(&str) -> Option<SqlExpr>;

/// One rewrite round over a whole query tree, bottom-up.
pub fn pass_query(query: SqlQuery) -> SqlQuery {
    match query {
        SqlQuery::Select(select) => SqlQuery::Select(Box::new(pass_select(*select))),
        SqlQuery::Combination(c) => SqlQuery::Combination(Box::new(Combination {
            kind: c.kind,
            left: pass_query(c.left),
            right: pass_query(c.right),
        })),
    }
}

fn pass_source(source: SqlSource) -> SqlSource {
    match source {
        SqlSource::Subquery { query, alias } => SqlSource::Subquery {
            query: Box::new(pass_query(*query)),
            alias,
        },
        SqlSource::Raw {
            fragments,
            args,
            alias,
        } => SqlSource::Raw {
            fragments,
            args: args.into_iter().map(simplify_expr).collect(),
            alias,
        },
        table => table,
    }
}

fn pass_select(mut select: Select) -> Select {
    select.from = select.from.map(pass_source);
    select.joins = select
        .joins
        .into_iter()
        .map(|join| SqlJoin {
            kind: join.kind,
            source: pass_source(join.source),
            on: join.on.map(simplify_expr),
            lateral: join.lateral,
        })
        .collect();
    for column in &mut select.columns {
        column.expr = simplify_expr(std::mem::replace(
            &mut column.expr,
            SqlExpr::CountAll,
        ));
    }
    select.where_clause = match select.where_clause.map(simplify_expr) {
        Some(SqlExpr::Lit { literal, .. })
            if literal.value == scalar::Value::Bool(true) =>
        {
            None
        }
        other => other,
    };
    select.group_by = select.group_by.into_iter().map(simplify_expr).collect();
    select.having = select.having.map(simplify_expr);
    for term in &mut select.order_by {
        term.expr = simplify_expr(std::mem::replace(&mut term.expr, SqlExpr::CountAll));
    }

    let select = merge_from_subquery(select);
    let select = lift_join_subqueries(select);
    delateralize(select)
}

// ---------------------------------------------------------------------------
// SELECT-from-SELECT merge

/// Whether the inner SELECT of a FROM subquery can be inlined into its
/// consumer without changing results: no row-count or dedup semantics of
/// its own, and a real FROM to hoist.
fn mergeable(inner: &Select) -> bool {
    inner.from.is_some()
        && inner.limit.is_none()
        && inner.offset.is_none()
        && !inner.distinct
        && inner.group_by.is_empty()
        && inner.having.is_none()
}

fn merge_from_subquery(outer: Select) -> Select {
    // A RIGHT or FULL join NULL-extends the FROM side, so a FROM-side
    // filter evaluated after such a join would drop the unmatched rows
    // the join exists to preserve. The filter stays inside.
    let null_extends_from = outer
        .joins
        .iter()
        .any(|j| matches!(j.kind, SqlJoinKind::Right | SqlJoinKind::Full));
    let (inner, alias) = match &outer.from {
        Some(SqlSource::Subquery { query, alias }) => match query.as_ref() {
            SqlQuery::Select(inner)
                if mergeable(inner)
                    && !(null_extends_from && inner.where_clause.is_some()) =>
            {
                (inner.as_ref().clone(), alias.clone())
            }
            _ => return outer,
        },
        _ => return outer,
    };

    // every inner output column becomes a substitution for `alias.col`
    let map: HashMap<String, SqlExpr> = inner
        .columns
        .iter()
        .map(|c| (c.alias.clone(), c.expr.clone()))
        .collect();
    let lookup = |col: &str| map.get(col).cloned();
    let lookup: Lookup = &lookup;

    let mut merged = Select::new(inner.from);
    merged.joins = inner.joins;
    merged.joins.extend(outer.joins.into_iter().map(|join| SqlJoin {
        kind: join.kind,
        source: subst_source(join.source, &alias, lookup),
        on: join.on.map(|on| subst_expr(on, &alias, lookup)),
        lateral: join.lateral,
    }));
    merged.distinct = outer.distinct;
    merged.columns = outer
        .columns
        .into_iter()
        .map(|c| SelectColumn::new(subst_expr(c.expr, &alias, lookup), c.alias))
        .collect();
    merged.where_clause = match (
        inner.where_clause,
        outer.where_clause.map(|w| subst_expr(w, &alias, lookup)),
    ) {
        (Some(a), Some(b)) => Some(SqlExpr::and(a, b)),
        (Some(a), None) => Some(a),
        (None, b) => b,
    };
    merged.group_by = outer
        .group_by
        .into_iter()
        .map(|g| subst_expr(g, &alias, lookup))
        .collect();
    merged.having = outer.having.map(|h| subst_expr(h, &alias, lookup));
    merged.order_by = outer
        .order_by
        .into_iter()
        .map(|mut term| {
            term.expr = subst_expr(term.expr, &alias, lookup);
            term
        })
        .collect();
    merged.limit = outer.limit;
    merged.offset = outer.offset;
    merged
}

/// Replace references to `alias` columns with the looked-up expressions,
/// descending into nested queries so correlated references follow too.
fn subst_expr(expr: SqlExpr, alias: &str, lookup: Lookup) -> SqlExpr {
    match expr {
        SqlExpr::Column { table, column } if table == alias => match lookup(&column) {
            Some(replacement) => replacement,
            None => SqlExpr::Column { table, column },
        },
        SqlExpr::Lit { .. } | SqlExpr::Column { .. } | SqlExpr::CountAll => expr,
        SqlExpr::Unary { op, inner } => SqlExpr::Unary {
            op,
            inner: Box::new(subst_expr(*inner, alias, lookup)),
        },
        SqlExpr::Binary { op, lhs, rhs } => SqlExpr::Binary {
            op,
            lhs: Box::new(subst_expr(*lhs, alias, lookup)),
            rhs: Box::new(subst_expr(*rhs, alias, lookup)),
        },
        SqlExpr::Case {
            subject,
            whens,
            fallback,
        } => SqlExpr::Case {
            subject: subject.map(|s| Box::new(subst_expr(*s, alias, lookup))),
            whens: whens
                .into_iter()
                .map(|(w, t)| (subst_expr(w, alias, lookup), subst_expr(t, alias, lookup)))
                .collect(),
            fallback: Box::new(subst_expr(*fallback, alias, lookup)),
        },
        SqlExpr::Func { func, args } => SqlExpr::Func {
            func,
            args: args
                .into_iter()
                .map(|a| subst_expr(a, alias, lookup))
                .collect(),
        },
        SqlExpr::RowNumber { order_by } => SqlExpr::RowNumber {
            order_by: order_by
                .into_iter()
                .map(|mut term| {
                    term.expr = subst_expr(term.expr, alias, lookup);
                    term
                })
                .collect(),
        },
        SqlExpr::Subquery(query) => {
            SqlExpr::Subquery(Box::new(subst_query(*query, alias, lookup)))
        }
        SqlExpr::Exists { query, negated } => SqlExpr::Exists {
            query: Box::new(subst_query(*query, alias, lookup)),
            negated,
        },
        SqlExpr::Cast { expr, to } => SqlExpr::Cast {
            expr: Box::new(subst_expr(*expr, alias, lookup)),
            to,
        },
        SqlExpr::Raw { fragments, args } => SqlExpr::Raw {
            fragments,
            args: args
                .into_iter()
                .map(|a| subst_expr(a, alias, lookup))
                .collect(),
        },
    }
}

fn subst_source(source: SqlSource, alias: &str, lookup: Lookup) -> SqlSource {
    match source {
        SqlSource::Subquery { query, alias: a } => SqlSource::Subquery {
            query: Box::new(subst_query(*query, alias, lookup)),
            alias: a,
        },
        SqlSource::Raw {
            fragments,
            args,
            alias: a,
        } => SqlSource::Raw {
            fragments,
            args: args
                .into_iter()
                .map(|arg| subst_expr(arg, alias, lookup))
                .collect(),
            alias: a,
        },
        table => table,
    }
}

fn subst_select(mut select: Select, alias: &str, lookup: Lookup) -> Select {
    select.from = select.from.map(|f| subst_source(f, alias, lookup));
    select.joins = select
        .joins
        .into_iter()
        .map(|join| SqlJoin {
            kind: join.kind,
            source: subst_source(join.source, alias, lookup),
            on: join.on.map(|on| subst_expr(on, alias, lookup)),
            lateral: join.lateral,
        })
        .collect();
    select.columns = select
        .columns
        .into_iter()
        .map(|c| SelectColumn::new(subst_expr(c.expr, alias, lookup), c.alias))
        .collect();
    select.where_clause = select.where_clause.map(|w| subst_expr(w, alias, lookup));
    select.group_by = select
        .group_by
        .into_iter()
        .map(|g| subst_expr(g, alias, lookup))
        .collect();
    select.having = select.having.map(|h| subst_expr(h, alias, lookup));
    select.order_by = select
        .order_by
        .into_iter()
        .map(|mut term| {
            term.expr = subst_expr(term.expr, alias, lookup);
            term
        })
        .collect();
    select
}

fn subst_query(query: SqlQuery, alias: &str, lookup: Lookup) -> SqlQuery {
    match query {
        SqlQuery::Select(select) => {
            SqlQuery::Select(Box::new(subst_select(*select, alias, lookup)))
        }
        SqlQuery::Combination(c) => SqlQuery::Combination(Box::new(Combination {
            kind: c.kind,
            left: subst_query(c.left, alias, lookup),
            right: subst_query(c.right, alias, lookup),
        })),
    }
}

// ---------------------------------------------------------------------------
// Join subquery lifting

/// Whether a join-position subquery can be dissolved into the enclosing
/// FROM scope.
fn join_liftable(inner: &Select, join: &SqlJoin) -> bool {
    if !mergeable(inner) {
        return false;
    }
    // window functions and raw fragments are scoped to their own SELECT
    if inner.columns.iter().any(|c| contains_opaque(&c.expr)) {
        return false;
    }
    // the subquery's filter moves into ON; a RIGHT or FULL join preserves
    // the subquery side and would resurrect filtered-out rows as
    // NULL-extended matches
    if inner.where_clause.is_some()
        && matches!(join.kind, SqlJoinKind::Right | SqlJoinKind::Full)
    {
        return false;
    }
    // sources pulled out of a LATERAL wrapper lose the right to correlate;
    // only plain tables are safe to hoist from one
    if join.lateral {
        let tables_only = matches!(inner.from, Some(SqlSource::Table { .. }))
            && inner
                .joins
                .iter()
                .all(|j| matches!(j.source, SqlSource::Table { .. }));
        if !tables_only {
            return false;
        }
    }
    // hoisted inner joins keep their left-associative grouping only when
    // the consuming join is INNER
    inner.joins.is_empty() || join.kind == SqlJoinKind::Inner
}

fn contains_opaque(expr: &SqlExpr) -> bool {
    let mut found = false;
    visit_expr(expr, &mut |e| {
        if matches!(e, SqlExpr::RowNumber { .. } | SqlExpr::Raw { .. }) {
            found = true;
        }
    });
    found
}

fn defined_aliases(select: &Select) -> Vec<String> {
    select
        .from
        .iter()
        .map(|f| f.alias().to_string())
        .chain(select.joins.iter().map(|j| j.source.alias().to_string()))
        .collect()
}

fn unused_alias(base: &str, taken: &HashSet<String>) -> String {
    let mut n = 1;
    loop {
        let candidate = format!("{}_{}", base, n);
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Rename one source alias everywhere inside a SELECT.
fn rename_alias(select: Select, from: &str, to: &str) -> Select {
    let lookup = |col: &str| Some(SqlExpr::column(to, col));
    let mut select = subst_select(select, from, &lookup);
    if let Some(source) = &mut select.from {
        if source.alias() == from {
            source.set_alias(to.to_string());
        }
    }
    for join in &mut select.joins {
        if join.source.alias() == from {
            join.source.set_alias(to.to_string());
        }
    }
    select
}

/// Dissolve liftable join-position subqueries: their FROM becomes the join
/// source, their own joins are hoisted right behind it, their filter folds
/// into the ON condition, and colliding aliases are renamed first.
fn lift_join_subqueries(mut select: Select) -> Select {
    let mut taken: HashSet<String> = HashSet::new();
    if let Some(from) = &select.from {
        taken.insert(from.alias().to_string());
    }
    for join in &select.joins {
        taken.insert(join.source.alias().to_string());
    }

    let mut pending: Vec<(String, HashMap<String, SqlExpr>)> = Vec::new();
    let mut joins = Vec::new();
    for join in std::mem::take(&mut select.joins) {
        let lifted = match &join.source {
            SqlSource::Subquery { query, alias } => match query.as_ref() {
                SqlQuery::Select(inner) if join_liftable(inner, &join) => {
                    Some((inner.as_ref().clone(), alias.clone()))
                }
                _ => None,
            },
            _ => None,
        };
        let (mut inner, alias) = match lifted {
            Some(lifted) => lifted,
            None => {
                joins.push(join);
                continue;
            }
        };

        for old in defined_aliases(&inner) {
            if taken.contains(&old) {
                let fresh = unused_alias(&old, &taken);
                inner = rename_alias(inner, &old, &fresh);
                taken.insert(fresh);
            } else {
                taken.insert(old);
            }
        }
        let from = match inner.from.take() {
            Some(from) => from,
            None => {
                joins.push(join);
                continue;
            }
        };

        let map: HashMap<String, SqlExpr> = inner
            .columns
            .iter()
            .map(|c| (c.alias.clone(), c.expr.clone()))
            .collect();
        let on = match (join.on, inner.where_clause) {
            (Some(on), Some(filter)) => Some(SqlExpr::and(on, filter)),
            (on, filter) => on.or(filter),
        };
        joins.push(SqlJoin {
            kind: join.kind,
            source: from,
            on,
            lateral: false,
        });
        joins.extend(inner.joins);
        pending.push((alias, map));
    }
    select.joins = joins;

    for (alias, map) in pending {
        let lookup = move |col: &str| map.get(col).cloned();
        select = subst_select(select, &alias, &lookup);
    }
    select
}

// ---------------------------------------------------------------------------
// De-lateralization

fn delateralize(mut select: Select) -> Select {
    for join in &mut select.joins {
        if !join.lateral {
            continue;
        }
        if let SqlSource::Subquery { query, .. } = &join.source {
            if !is_correlated(query) {
                join.lateral = false;
            }
        }
    }
    select
}

/// A query correlates when it references aliases defined outside itself.
/// Raw fragments are opaque, so their presence counts as correlated.
fn is_correlated(query: &SqlQuery) -> bool {
    let mut defined = HashSet::new();
    collect_defined(query, &mut defined);
    let mut referenced = HashSet::new();
    let mut has_raw = false;
    collect_referenced(query, &mut referenced, &mut has_raw);
    has_raw || referenced.iter().any(|alias| !defined.contains(alias))
}

fn collect_defined(query: &SqlQuery, out: &mut HashSet<String>) {
    match query {
        SqlQuery::Select(select) => {
            let mut sources: Vec<&SqlSource> = select.from.iter().collect();
            sources.extend(select.joins.iter().map(|j| &j.source));
            for source in sources {
                out.insert(source.alias().to_string());
                if let SqlSource::Subquery { query, .. } = source {
                    collect_defined(query, out);
                }
            }
            let mut exprs: Vec<&SqlExpr> = select.columns.iter().map(|c| &c.expr).collect();
            exprs.extend(select.where_clause.iter());
            exprs.extend(select.joins.iter().filter_map(|j| j.on.as_ref()));
            exprs.extend(select.group_by.iter());
            exprs.extend(select.having.iter());
            exprs.extend(select.order_by.iter().map(|t| &t.expr));
            for expr in exprs {
                collect_defined_in_expr(expr, out);
            }
        }
        SqlQuery::Combination(c) => {
            collect_defined(&c.left, out);
            collect_defined(&c.right, out);
        }
    }
}

fn collect_defined_in_expr(expr: &SqlExpr, out: &mut HashSet<String>) {
    visit_expr(expr, &mut |e| {
        if let SqlExpr::Subquery(q) | SqlExpr::Exists { query: q, .. } = e {
            collect_defined(q, out);
        }
    });
}

fn collect_referenced(query: &SqlQuery, out: &mut HashSet<String>, has_raw: &mut bool) {
    match query {
        SqlQuery::Select(select) => {
            let mut sources: Vec<&SqlSource> = select.from.iter().collect();
            sources.extend(select.joins.iter().map(|j| &j.source));
            for source in sources {
                match source {
                    SqlSource::Subquery { query, .. } => {
                        collect_referenced(query, out, has_raw)
                    }
                    SqlSource::Raw { .. } => *has_raw = true,
                    SqlSource::Table { .. } => {}
                }
            }
            let mut exprs: Vec<&SqlExpr> = select.columns.iter().map(|c| &c.expr).collect();
            exprs.extend(select.where_clause.iter());
            exprs.extend(select.joins.iter().filter_map(|j| j.on.as_ref()));
            exprs.extend(select.group_by.iter());
            exprs.extend(select.having.iter());
            exprs.extend(select.order_by.iter().map(|t| &t.expr));
            for expr in exprs {
                visit_expr(expr, &mut |e| match e {
                    SqlExpr::Column { table, .. } => {
                        out.insert(table.clone());
                    }
                    SqlExpr::Subquery(q) | SqlExpr::Exists { query: q, .. } => {
                        collect_referenced(q, out, has_raw)
                    }
                    SqlExpr::Raw { .. } => *has_raw = true,
                    _ => {}
                });
            }
        }
        SqlQuery::Combination(c) => {
            collect_referenced(&c.left, out, has_raw);
            collect_referenced(&c.right, out, has_raw);
        }
    }
}

fn visit_expr(expr: &SqlExpr, f: &mut impl FnMut(&SqlExpr)) {
    f(expr);
    match expr {
        SqlExpr::Lit { .. }
        | SqlExpr::Column { .. }
        | SqlExpr::CountAll
        | SqlExpr::Subquery(_)
        | SqlExpr::Exists { .. } => {}
        SqlExpr::Unary { inner, .. } => visit_expr(inner, f),
        SqlExpr::Binary { lhs, rhs, .. } => {
            visit_expr(lhs, f);
            visit_expr(rhs, f);
        }
        SqlExpr::Case {
            subject,
            whens,
            fallback,
        } => {
            if let Some(subject) = subject {
                visit_expr(subject, f);
            }
            for (when, then) in whens {
                visit_expr(when, f);
                visit_expr(then, f);
            }
            visit_expr(fallback, f);
        }
        SqlExpr::Func { args, .. } | SqlExpr::Raw { args, .. } => {
            for arg in args {
                visit_expr(arg, f);
            }
        }
        SqlExpr::RowNumber { order_by } => {
            for term in order_by {
                visit_expr(&term.expr, f);
            }
        }
        SqlExpr::Cast { expr, .. } => visit_expr(expr, f),
    }
}

// ---------------------------------------------------------------------------
// Final cleanup

/// Drop internal ordering helper columns from the outermost SELECT; its
/// ORDER BY carries the expressions directly.
pub fn strip_system_columns(query: SqlQuery) -> SqlQuery {
    match query {
        SqlQuery::Select(mut select) => {
            select
                .columns
                .retain(|c| !names::is_ordering_column(&c.alias));
            SqlQuery::Select(select)
        }
        combination => combination,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scalar::Literal;
    use sqltree::SqlBinaryOp;

    fn table_select(table: &str, alias: &str, cols: &[&str]) -> Select {
        let mut select = Select::new(Some(SqlSource::Table {
            name: table.to_string(),
            alias: alias.to_string(),
        }));
        for col in cols {
            select
                .columns
                .push(SelectColumn::new(SqlExpr::column(alias, *col), *col));
        }
        select
    }

    fn eq(lhs: SqlExpr, rhs: SqlExpr) -> SqlExpr {
        SqlExpr::binary(SqlBinaryOp::Eq, lhs, rhs)
    }

    #[test]
    fn test_merge_pulls_where_into_inner() {
        let inner = table_select("posts", "t1", &["id", "title"]);
        let mut outer = Select::new(Some(SqlSource::Subquery {
            query: Box::new(SqlQuery::select(inner)),
            alias: "t0".to_string(),
        }));
        outer
            .columns
            .push(SelectColumn::new(SqlExpr::column("t0", "title"), "title"));
        outer.where_clause = Some(SqlExpr::binary(
            SqlBinaryOp::Gt,
            SqlExpr::column("t0", "id"),
            SqlExpr::lit(Literal::i64(3)),
        ));

        let merged = merge_from_subquery(outer);
        assert!(matches!(
            merged.from,
            Some(SqlSource::Table { ref name, .. }) if name == "posts"
        ));
        assert_eq!(merged.columns[0].expr, SqlExpr::column("t1", "title"));
        assert_eq!(
            merged.where_clause,
            Some(SqlExpr::binary(
                SqlBinaryOp::Gt,
                SqlExpr::column("t1", "id"),
                SqlExpr::lit(Literal::i64(3)),
            ))
        );
    }

    #[test]
    fn test_merge_refuses_paginated_inner() {
        let mut inner = table_select("posts", "t1", &["id"]);
        inner.limit = Some(10);
        let mut outer = Select::new(Some(SqlSource::Subquery {
            query: Box::new(SqlQuery::select(inner)),
            alias: "t0".to_string(),
        }));
        outer
            .columns
            .push(SelectColumn::new(SqlExpr::column("t0", "id"), "id"));
        let merged = merge_from_subquery(outer.clone());
        assert_eq!(merged, outer);
    }

    #[test]
    fn test_merge_refuses_filtered_from_under_full_join() {
        let mut inner = table_select("posts", "t1", &["id", "author_id"]);
        inner.where_clause = Some(eq(
            SqlExpr::column("t1", "author_id"),
            SqlExpr::lit(Literal::i64(1)),
        ));
        let mut outer = Select::new(Some(SqlSource::Subquery {
            query: Box::new(SqlQuery::select(inner)),
            alias: "t0".to_string(),
        }));
        outer
            .columns
            .push(SelectColumn::new(SqlExpr::column("t0", "id"), "id"));
        outer.joins.push(SqlJoin {
            kind: SqlJoinKind::Full,
            source: SqlSource::Table {
                name: "users".to_string(),
                alias: "t2".to_string(),
            },
            on: Some(eq(
                SqlExpr::column("t2", "id"),
                SqlExpr::column("t0", "author_id"),
            )),
            lateral: false,
        });

        // merging would evaluate the filter after the FULL join and drop
        // the NULL-extended unmatched rows
        let merged = merge_from_subquery(outer.clone());
        assert_eq!(merged, outer);

        // the same shape behind an INNER join merges fine
        let mut inner_join = outer;
        inner_join.joins[0].kind = SqlJoinKind::Inner;
        let merged = merge_from_subquery(inner_join);
        assert!(matches!(
            merged.from,
            Some(SqlSource::Table { ref name, .. }) if name == "posts"
        ));
    }

    #[test]
    fn test_identity_join_subquery_dissolves_to_its_table() {
        let inner = table_select("users", "t2", &["id", "name"]);
        let mut select = table_select("posts", "t0", &["id"]);
        select.joins.push(SqlJoin {
            kind: SqlJoinKind::Inner,
            source: SqlSource::Subquery {
                query: Box::new(SqlQuery::select(inner)),
                alias: "t1".to_string(),
            },
            on: Some(eq(
                SqlExpr::column("t1", "id"),
                SqlExpr::column("t0", "author_id"),
            )),
            lateral: false,
        });
        let lifted = lift_join_subqueries(select);
        assert_eq!(
            lifted.joins[0].source,
            SqlSource::Table {
                name: "users".to_string(),
                alias: "t2".to_string(),
            }
        );
        assert_eq!(
            lifted.joins[0].on,
            Some(eq(
                SqlExpr::column("t2", "id"),
                SqlExpr::column("t0", "author_id"),
            ))
        );
    }

    #[test]
    fn test_filtered_join_subquery_folds_filter_into_on() {
        let mut inner = table_select("users", "t2", &["id", "name"]);
        inner.where_clause = Some(SqlExpr::binary(
            SqlBinaryOp::Gt,
            SqlExpr::column("t2", "id"),
            SqlExpr::lit(Literal::i64(1)),
        ));
        let mut select = table_select("posts", "t0", &["id"]);
        select.joins.push(SqlJoin {
            kind: SqlJoinKind::Left,
            source: SqlSource::Subquery {
                query: Box::new(SqlQuery::select(inner)),
                alias: "t1".to_string(),
            },
            on: Some(eq(
                SqlExpr::column("t1", "id"),
                SqlExpr::column("t0", "author_id"),
            )),
            lateral: false,
        });
        let lifted = lift_join_subqueries(select);
        assert_eq!(lifted.joins.len(), 1);
        assert_eq!(
            lifted.joins[0].source,
            SqlSource::Table {
                name: "users".to_string(),
                alias: "t2".to_string(),
            }
        );
        // LEFT preserves the other side, so the filter is safe inside ON
        assert_eq!(
            lifted.joins[0].on,
            Some(SqlExpr::and(
                eq(
                    SqlExpr::column("t2", "id"),
                    SqlExpr::column("t0", "author_id"),
                ),
                SqlExpr::binary(
                    SqlBinaryOp::Gt,
                    SqlExpr::column("t2", "id"),
                    SqlExpr::lit(Literal::i64(1)),
                ),
            ))
        );
    }

    #[test]
    fn test_join_subquery_with_own_joins_hoists_them() {
        let mut inner = table_select("users", "t2", &["id"]);
        inner.joins.push(SqlJoin {
            kind: SqlJoinKind::Left,
            source: SqlSource::Table {
                name: "profiles".to_string(),
                alias: "t3".to_string(),
            },
            on: Some(eq(
                SqlExpr::column("t3", "user_id"),
                SqlExpr::column("t2", "id"),
            )),
            lateral: false,
        });
        let mut select = table_select("posts", "t0", &["id"]);
        select.joins.push(SqlJoin {
            kind: SqlJoinKind::Inner,
            source: SqlSource::Subquery {
                query: Box::new(SqlQuery::select(inner)),
                alias: "t1".to_string(),
            },
            on: Some(eq(
                SqlExpr::column("t1", "id"),
                SqlExpr::column("t0", "author_id"),
            )),
            lateral: false,
        });
        let lifted = lift_join_subqueries(select);
        assert_eq!(lifted.joins.len(), 2);
        assert_eq!(
            lifted.joins[0].source,
            SqlSource::Table {
                name: "users".to_string(),
                alias: "t2".to_string(),
            }
        );
        assert_eq!(
            lifted.joins[1].source,
            SqlSource::Table {
                name: "profiles".to_string(),
                alias: "t3".to_string(),
            }
        );
    }

    #[test]
    fn test_right_join_keeps_filtered_subquery_nested() {
        let mut inner = table_select("users", "t2", &["id"]);
        inner.where_clause = Some(SqlExpr::binary(
            SqlBinaryOp::Gt,
            SqlExpr::column("t2", "id"),
            SqlExpr::lit(Literal::i64(1)),
        ));
        let mut select = table_select("posts", "t0", &["id"]);
        select.joins.push(SqlJoin {
            kind: SqlJoinKind::Right,
            source: SqlSource::Subquery {
                query: Box::new(SqlQuery::select(inner)),
                alias: "t1".to_string(),
            },
            on: Some(eq(
                SqlExpr::column("t1", "id"),
                SqlExpr::column("t0", "author_id"),
            )),
            lateral: false,
        });
        let lifted = lift_join_subqueries(select.clone());
        assert_eq!(lifted, select);
    }

    #[test]
    fn test_lift_renames_colliding_aliases() {
        // the subquery's own table reuses the outer FROM alias
        let inner = table_select("users", "t0", &["id"]);
        let mut select = table_select("posts", "t0", &["id"]);
        select.joins.push(SqlJoin {
            kind: SqlJoinKind::Inner,
            source: SqlSource::Subquery {
                query: Box::new(SqlQuery::select(inner)),
                alias: "t1".to_string(),
            },
            on: Some(eq(
                SqlExpr::column("t1", "id"),
                SqlExpr::column("t0", "author_id"),
            )),
            lateral: false,
        });
        let lifted = lift_join_subqueries(select);
        assert_eq!(
            lifted.joins[0].source,
            SqlSource::Table {
                name: "users".to_string(),
                alias: "t0_1".to_string(),
            }
        );
        assert_eq!(
            lifted.joins[0].on,
            Some(eq(
                SqlExpr::column("t0_1", "id"),
                SqlExpr::column("t0", "author_id"),
            ))
        );
    }

    #[test]
    fn test_correlation_detection() {
        let mut inner = table_select("posts", "t1", &["id"]);
        inner.where_clause = Some(eq(
            SqlExpr::column("t1", "author_id"),
            SqlExpr::column("t9", "id"),
        ));
        assert!(is_correlated(&SqlQuery::select(inner)));

        let plain = table_select("posts", "t1", &["id"]);
        assert!(!is_correlated(&SqlQuery::select(plain)));
    }
}
