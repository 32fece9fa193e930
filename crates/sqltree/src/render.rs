//! SQL tree to text
//!
//! Single-pass renderer over the neutral tree. Expressions get defensive
//! parentheses instead of a precedence table; the output is meant for a
//! database server, not for humans.

use scalar::{Literal, Value};

use crate::ast::{
    Combination, CombinationKind, Select, SqlBinaryOp, SqlExpr, SqlFunc, SqlJoin, SqlJoinKind,
    SqlNulls, SqlOrderBy, SqlQuery, SqlSource, SqlUnaryOp,
};
use crate::dialect::{Dialect, NullsHandling};

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// Emit placeholders and collect a parameter list instead of
    /// inlining literals into the SQL text.
    pub parameterized: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            parameterized: true,
        }
    }
}

/// SQL text plus its flat parameter list, in placeholder order.
///
/// Array literals are expanded at render time, so `args` only ever holds
/// scalar values.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSql {
    pub sql: String,
    pub args: Vec<Value>,
}

pub fn render(query: &SqlQuery, dialect: &dyn Dialect, options: &RenderOptions) -> RenderedSql {
    let mut r = Renderer {
        dialect,
        parameterized: options.parameterized,
        sql: String::new(),
        args: Vec::new(),
    };
    r.query(query);
    tracing::debug!(dialect = dialect.name(), sql = %r.sql, "rendered sql");
    RenderedSql {
        sql: r.sql,
        args: r.args,
    }
}

struct Renderer<'a> {
    dialect: &'a dyn Dialect,
    parameterized: bool,
    sql: String,
    args: Vec<Value>,
}

impl Renderer<'_> {
    fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    fn ident(&mut self, name: &str) {
        let quoted = self.dialect.quote_ident(name);
        self.sql.push_str(&quoted);
    }

    fn query(&mut self, query: &SqlQuery) {
        match query {
            SqlQuery::Select(select) => self.select(select),
            SqlQuery::Combination(c) => self.combination(c),
        }
    }

    fn combination(&mut self, c: &Combination) {
        // SQLite rejects parenthesized compound operands, so both sides
        // render bare. The compiler never puts ORDER BY or LIMIT on a
        // combination operand directly.
        self.query(&c.left);
        self.push(match c.kind {
            CombinationKind::Union => " UNION ",
            CombinationKind::UnionAll => " UNION ALL ",
            CombinationKind::Intersect => " INTERSECT ",
            CombinationKind::Except => " EXCEPT ",
        });
        self.query(&c.right);
    }

    fn select(&mut self, select: &Select) {
        self.push("SELECT ");
        if select.distinct {
            self.push("DISTINCT ");
        }
        if select.columns.is_empty() {
            self.push("*");
        } else {
            for (i, col) in select.columns.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.expr(&col.expr);
                self.push(" AS ");
                self.ident(&col.alias);
            }
        }
        if let Some(from) = &select.from {
            self.push(" FROM ");
            self.source(from);
        }
        for join in &select.joins {
            self.join(join);
        }
        if let Some(where_clause) = &select.where_clause {
            self.push(" WHERE ");
            self.expr(where_clause);
        }
        if !select.group_by.is_empty() {
            self.push(" GROUP BY ");
            for (i, expr) in select.group_by.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.expr(expr);
            }
        }
        if let Some(having) = &select.having {
            self.push(" HAVING ");
            self.expr(having);
        }
        if !select.order_by.is_empty() {
            self.push(" ORDER BY ");
            self.order_terms(&select.order_by);
        }
        if let Some(limit) = select.limit {
            self.push(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = select.offset {
            self.push(&format!(" OFFSET {}", offset));
        }
    }

    fn source(&mut self, source: &SqlSource) {
        match source {
            SqlSource::Table { name, alias } => {
                self.ident(name);
                self.push(" AS ");
                self.ident(alias);
            }
            SqlSource::Subquery { query, alias } => {
                self.push("(");
                self.query(query);
                self.push(") AS ");
                self.ident(alias);
            }
            SqlSource::Raw {
                fragments,
                args,
                alias,
            } => {
                self.push("(");
                self.raw(fragments, args);
                self.push(") AS ");
                self.ident(alias);
            }
        }
    }

    fn join(&mut self, join: &SqlJoin) {
        self.push(match join.kind {
            SqlJoinKind::Inner => " INNER JOIN ",
            SqlJoinKind::Left => " LEFT JOIN ",
            SqlJoinKind::Right => " RIGHT JOIN ",
            SqlJoinKind::Full => " FULL JOIN ",
        });
        if join.lateral && self.dialect.supports_lateral_keyword() {
            self.push("LATERAL ");
        }
        self.source(&join.source);
        self.push(" ON ");
        match &join.on {
            Some(on) => self.expr(on),
            None => self.push("TRUE"),
        }
    }

    fn order_terms(&mut self, terms: &[SqlOrderBy]) {
        let handling = self.dialect.nulls_handling();
        let mut first = true;
        for term in terms {
            // Native placement in SQLite and MySQL is nulls-first on ASC
            // and nulls-last on DESC; that is also what Default means.
            let native = if term.desc {
                SqlNulls::Last
            } else {
                SqlNulls::First
            };
            let wanted = match term.nulls {
                SqlNulls::Default => native,
                other => other,
            };
            if let NullsHandling::Emulate = handling {
                if wanted != native {
                    if !first {
                        self.push(", ");
                    }
                    first = false;
                    self.push("(");
                    self.expr(&term.expr);
                    self.push(" IS NULL)");
                    self.push(match wanted {
                        SqlNulls::First => " DESC",
                        _ => " ASC",
                    });
                }
            }
            if !first {
                self.push(", ");
            }
            first = false;
            self.expr(&term.expr);
            if term.desc {
                self.push(" DESC");
            } else {
                self.push(" ASC");
            }
            if let NullsHandling::Keyword { always_explicit } = handling {
                if always_explicit || wanted != native {
                    self.push(match wanted {
                        SqlNulls::First => " NULLS FIRST",
                        _ => " NULLS LAST",
                    });
                }
            }
        }
    }

    fn expr(&mut self, expr: &SqlExpr) {
        match expr {
            SqlExpr::Lit { literal, parameter } => self.literal(literal, *parameter),
            SqlExpr::Column { table, column } => {
                self.ident(table);
                self.push(".");
                self.ident(column);
            }
            SqlExpr::Unary { op, inner } => self.unary(*op, inner),
            SqlExpr::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs),
            SqlExpr::Case {
                subject,
                whens,
                fallback,
            } => {
                self.push("CASE");
                if let Some(subject) = subject {
                    self.push(" ");
                    self.expr(subject);
                }
                for (cond, value) in whens {
                    self.push(" WHEN ");
                    self.expr(cond);
                    self.push(" THEN ");
                    self.expr(value);
                }
                self.push(" ELSE ");
                self.expr(fallback);
                self.push(" END");
            }
            SqlExpr::Func { func, args } => {
                let name = match func {
                    SqlFunc::Lower => "LOWER",
                    SqlFunc::Upper => "UPPER",
                    SqlFunc::Length => self.dialect.length_function(),
                    SqlFunc::Coalesce => "COALESCE",
                    SqlFunc::Abs => "ABS",
                    SqlFunc::Count => "COUNT",
                    SqlFunc::Sum => "SUM",
                    SqlFunc::Avg => "AVG",
                    SqlFunc::Min => "MIN",
                    SqlFunc::Max => "MAX",
                    SqlFunc::Concat => "CONCAT",
                };
                self.push(name);
                self.push("(");
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(arg);
                }
                self.push(")");
            }
            SqlExpr::CountAll => self.push("COUNT(*)"),
            SqlExpr::RowNumber { order_by } => {
                self.push("ROW_NUMBER() OVER (");
                if !order_by.is_empty() {
                    self.push("ORDER BY ");
                    self.order_terms(order_by);
                }
                self.push(")");
            }
            SqlExpr::Subquery(query) => {
                self.push("(");
                self.query(query);
                self.push(")");
            }
            SqlExpr::Exists { query, negated } => {
                if *negated {
                    self.push("NOT ");
                }
                self.push("EXISTS (");
                self.query(query);
                self.push(")");
            }
            SqlExpr::Cast { expr, to } => {
                self.push("CAST(");
                self.expr(expr);
                self.push(" AS ");
                self.push(self.dialect.cast_type(*to));
                self.push(")");
            }
            SqlExpr::Raw { fragments, args } => self.raw(fragments, args),
        }
    }

    fn unary(&mut self, op: SqlUnaryOp, inner: &SqlExpr) {
        match op {
            SqlUnaryOp::Not => {
                self.push("(NOT ");
                self.expr(inner);
                self.push(")");
            }
            SqlUnaryOp::Neg => {
                self.push("(-");
                self.expr(inner);
                self.push(")");
            }
            SqlUnaryOp::BitNot => {
                self.push("(~");
                self.expr(inner);
                self.push(")");
            }
            SqlUnaryOp::IsNull => {
                self.push("(");
                self.expr(inner);
                self.push(" IS NULL)");
            }
            SqlUnaryOp::IsNotNull => {
                self.push("(");
                self.expr(inner);
                self.push(" IS NOT NULL)");
            }
        }
    }

    fn binary(&mut self, op: SqlBinaryOp, lhs: &SqlExpr, rhs: &SqlExpr) {
        if op == SqlBinaryOp::Concat && self.dialect.concat_via_function() {
            self.push("CONCAT(");
            self.expr(lhs);
            self.push(", ");
            self.expr(rhs);
            self.push(")");
            return;
        }
        if op == SqlBinaryOp::BitXor && self.dialect.native_xor().is_none() {
            // (~(a & b)) & (a | b)
            self.push("((~(");
            self.expr(lhs);
            self.push(" & ");
            self.expr(rhs);
            self.push(")) & (");
            self.expr(lhs);
            self.push(" | ");
            self.expr(rhs);
            self.push("))");
            return;
        }
        let symbol = match op {
            SqlBinaryOp::Add => "+",
            SqlBinaryOp::Sub => "-",
            SqlBinaryOp::Mul => "*",
            SqlBinaryOp::Div => "/",
            SqlBinaryOp::Mod => "%",
            SqlBinaryOp::Concat => "||",
            SqlBinaryOp::Eq => "=",
            SqlBinaryOp::Ne => "<>",
            SqlBinaryOp::Lt => "<",
            SqlBinaryOp::Le => "<=",
            SqlBinaryOp::Gt => ">",
            SqlBinaryOp::Ge => ">=",
            SqlBinaryOp::And => "AND",
            SqlBinaryOp::Or => "OR",
            SqlBinaryOp::Like => "LIKE",
            SqlBinaryOp::In => "IN",
            SqlBinaryOp::BitAnd => "&",
            SqlBinaryOp::BitOr => "|",
            // Reached only when the dialect has a native operator
            SqlBinaryOp::BitXor => self.dialect.native_xor().unwrap_or("^"),
            SqlBinaryOp::Shl => "<<",
            SqlBinaryOp::Shr => ">>",
        };
        self.push("(");
        self.expr(lhs);
        self.push(" ");
        self.push(symbol);
        self.push(" ");
        self.expr(rhs);
        self.push(")");
    }

    fn raw(&mut self, fragments: &[String], args: &[SqlExpr]) {
        for (i, fragment) in fragments.iter().enumerate() {
            self.push(fragment);
            if let Some(arg) = args.get(i) {
                self.expr(arg);
            }
        }
    }

    fn literal(&mut self, literal: &Literal, parameter: bool) {
        if self.parameterized && parameter {
            match &literal.value {
                // IN lists take a parenthesized placeholder per item so
                // the parameter list stays scalar-only.
                Value::Array(items) => {
                    let item_ty = match &literal.ty.base {
                        scalar::BaseType::Array(item) => (**item).clone(),
                        _ => literal.ty.clone(),
                    };
                    if items.is_empty() {
                        self.push("(NULL)");
                        return;
                    }
                    self.push("(");
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            self.push(", ");
                        }
                        self.args.push(item.clone());
                        let placeholder = self.dialect.placeholder(self.args.len(), &item_ty);
                        self.push(&placeholder);
                    }
                    self.push(")");
                }
                Value::Null => self.push("NULL"),
                value => {
                    self.args.push(value.clone());
                    let placeholder = self.dialect.placeholder(self.args.len(), &literal.ty);
                    self.push(&placeholder);
                }
            }
        } else {
            self.inline_value(&literal.value);
        }
    }

    fn inline_value(&mut self, value: &Value) {
        match value {
            Value::Null => self.push("NULL"),
            Value::Bool(true) => self.push("TRUE"),
            Value::Bool(false) => self.push("FALSE"),
            Value::Int(n) => self.push(&n.to_string()),
            Value::Float(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    self.push(&format!("{:.1}", n));
                } else {
                    self.push(&n.to_string());
                }
            }
            Value::Text(s) => {
                self.push("'");
                self.push(&s.replace('\'', "''"));
                self.push("'");
            }
            Value::Array(items) => {
                self.push("(");
                if items.is_empty() {
                    self.push("NULL");
                }
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.inline_value(item);
                }
                self.push(")");
            }
        }
    }
}
