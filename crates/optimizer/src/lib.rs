//! SQL tree rewrites
//!
//! The compiler nests one SELECT per operator node; these passes fold the
//! nesting back down and clean up the boolean plumbing, without changing
//! what the query returns. Rewrites run to a fixpoint, so optimizing an
//! already-optimized tree is a no-op.

pub mod expr;
pub mod structure;

use sqltree::SqlQuery;

pub use expr::{provably_not_null, simplify_expr};

/// Run all rewrites to a fixpoint, then strip the internal ordering
/// helper columns from the outermost SELECT.
pub fn optimize(query: SqlQuery) -> SqlQuery {
    let mut current = query;
    loop {
        let next = structure::pass_query(current.clone());
        if next == current {
            break;
        }
        current = next;
    }
    let optimized = structure::strip_system_columns(current);
    tracing::debug!("optimized sql tree");
    optimized
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqltree::{render, RenderOptions, SqliteDialect};

    fn sqlite(sql: &SqlQuery) -> String {
        render(
            sql,
            &SqliteDialect,
            &RenderOptions {
                parameterized: false,
            },
        )
        .sql
    }

    fn blog() -> (algebra::Catalog, algebra::TableId, algebra::TableId) {
        use algebra::{Field, Ref, RefCondition, Schema};
        use scalar::{BaseType, ScalarType};
        let mut builder = algebra::Catalog::builder();
        let users = builder.reserve();
        let posts = builder.reserve();
        builder.define(
            users,
            "users",
            Schema::new(vec![
                Field::new("id", ScalarType::new(BaseType::I64)),
                Field::new("name", ScalarType::new(BaseType::Text)),
            ]),
        );
        builder.define(
            posts,
            "posts",
            Schema::with_refs(
                vec![
                    Field::new("id", ScalarType::new(BaseType::I64)),
                    Field::new("title", ScalarType::new(BaseType::Text)),
                    Field::new("author_id", ScalarType::new(BaseType::I64)),
                ],
                vec![Ref::Forward {
                    name: "author".to_string(),
                    target: users,
                    on: RefCondition::eq("author_id", "id"),
                    nullable: false,
                }],
            ),
        );
        (builder.finish().unwrap(), users, posts)
    }

    #[test]
    fn test_filter_chain_flattens_to_one_select() {
        let (catalog, _, posts) = blog();
        let q = catalog
            .query(posts)
            .filter(|h| h.get("id").gt(0i64))
            .map(|h| h.get("title").expr());
        let sql = optimize(compiler::compile(&q).unwrap());
        let text = sqlite(&sql);
        assert!(!text.contains("(SELECT"));
        assert!(text.contains("FROM \"posts\""));
        assert!(text.contains("WHERE"));
    }

    #[test]
    fn test_ordering_helpers_stripped_from_output() {
        let (catalog, _, posts) = blog();
        let q = catalog
            .query(posts)
            .order_by_asc(|h| h.get("title").expr())
            .filter(|h| h.get("id").gt(0i64));
        let sql = optimize(compiler::compile(&q).unwrap());
        let text = sqlite(&sql);
        assert!(!text.contains("$sys$ord"));
        assert!(text.contains("ORDER BY"));
    }

    #[test]
    fn test_optimize_is_idempotent() {
        let (catalog, users, posts) = blog();
        let queries = vec![
            catalog.query(posts).filter(|h| h.get("id").eq(1i64)),
            catalog
                .query(posts)
                .map(|h| h.get("author").get("name").expr())
                .unique(),
            catalog
                .query(users)
                .order_by_desc(|h| h.get("name").expr())
                .limit(3),
        ];
        for q in queries {
            let once = optimize(compiler::compile(&q).unwrap());
            let twice = optimize(once.clone());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_uncorrelated_flat_map_loses_lateral() {
        use sqltree::PostgresDialect;
        let (catalog, _, posts) = blog();
        let inner = catalog.query(posts).map(|h| h.get("title").expr());
        let q = catalog.query(posts).flat_map(move |_| inner);
        let compiled = compiler::compile(&q).unwrap();
        let before = render(&compiled, &PostgresDialect, &RenderOptions::default());
        assert!(before.sql.contains("LATERAL"));
        let after = render(
            &optimize(compiled),
            &PostgresDialect,
            &RenderOptions::default(),
        );
        assert!(!after.sql.contains("LATERAL"));
    }
}
