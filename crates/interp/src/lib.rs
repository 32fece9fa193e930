//! Reference interpreter
//!
//! Executes the query algebra directly over in-memory tables, bypassing SQL.
//! It is deliberately naive; its results define the semantics the compiled
//! SQL is differentially tested against. Group-by, raw SQL views and raw SQL
//! expressions are explicit hard errors, never approximations.

pub mod database;
pub mod error;
pub mod eval;

pub use database::{Database, Row};
pub use error::InterpError;
pub use eval::interpret;

#[cfg(test)]
mod tests {
    use super::*;
    use algebra::{
        names, Catalog, CombineKind, Field, JoinKind, Ref, RefCondition, Schema, TableId,
    };
    use scalar::{BaseType, Literal, ScalarType, Value};

    fn blog() -> (Catalog, TableId, TableId) {
        let mut builder = Catalog::builder();
        let users = builder.reserve();
        let posts = builder.reserve();
        builder.define(
            users,
            "users",
            Schema::with_refs(
                vec![
                    Field::new("id", ScalarType::new(BaseType::I64)),
                    Field::new("name", ScalarType::new(BaseType::Text)),
                ],
                vec![Ref::Back {
                    name: "posts".to_string(),
                    target: posts,
                    on: RefCondition::eq("id", "author_id"),
                }],
            ),
        );
        builder.define(
            posts,
            "posts",
            Schema::with_refs(
                vec![
                    Field::new("id", ScalarType::new(BaseType::I64)),
                    Field::new("title", ScalarType::new(BaseType::Text)),
                    Field::new("author_id", ScalarType::new(BaseType::I64)),
                    Field::new("score", ScalarType::nullable(BaseType::I64)),
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

    fn blog_db() -> (Database, TableId, TableId) {
        let (catalog, users, posts) = blog();
        let mut db = Database::new(catalog);
        for (id, name) in [(1, "ada"), (2, "brian"), (3, "grace")] {
            db.insert(users, &[("id", Value::Int(id)), ("name", Value::Text(name.into()))])
                .unwrap();
        }
        let rows: [(i64, &str, i64, Value); 6] = [
            (1, "TypeScript", 1, Value::Int(10)),
            (2, "rust", 1, Value::Null),
            (3, "C#", 1, Value::Int(4)),
            (4, "Ruby", 2, Value::Int(7)),
            (5, "C++", 2, Value::Null),
            (6, "Python", 3, Value::Int(9)),
        ];
        for (id, title, author, score) in rows {
            db.insert(
                posts,
                &[
                    ("id", Value::Int(id)),
                    ("title", Value::Text(title.into())),
                    ("author_id", Value::Int(author)),
                    ("score", score),
                ],
            )
            .unwrap();
        }
        (db, users, posts)
    }

    fn titles(rows: &[Row]) -> Vec<String> {
        rows.iter()
            .map(|r| match &r[names::SCALAR_COLUMN] {
                Value::Text(s) => s.clone(),
                other => panic!("not text: {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_proxy_returns_all_rows() {
        let (db, users, _) = blog_db();
        let rows = interpret(&db.catalog().query(users), &db).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["name"], Value::Text("ada".into()));
    }

    #[test]
    fn test_filter_and_map() {
        let (db, _, posts) = blog_db();
        let q = db
            .catalog()
            .query(posts)
            .filter(|h| h.get("author_id").eq(2i64))
            .map(|h| h.get("title").expr());
        let rows = interpret(&q, &db).unwrap();
        assert_eq!(titles(&rows), vec!["Ruby", "C++"]);
    }

    #[test]
    fn test_scenario_order_limit_map() {
        let (db, _, posts) = blog_db();
        let q = db
            .catalog()
            .query(posts)
            .order_by_asc(|h| h.get("id").expr())
            .limit(3)
            .map(|h| h.get("title").expr());
        let rows = interpret(&q, &db).unwrap();
        assert_eq!(titles(&rows), vec!["TypeScript", "rust", "C#"]);
    }

    #[test]
    fn test_locator_through_forward_ref() {
        let (db, _, posts) = blog_db();
        let q = db
            .catalog()
            .query(posts)
            .filter(|h| h.get("id").eq(6i64))
            .map(|h| h.get("author").get("name").expr());
        let rows = interpret(&q, &db).unwrap();
        assert_eq!(titles(&rows), vec!["grace"]);
    }

    #[test]
    fn test_null_safe_equality() {
        let (db, _, posts) = blog_db();
        // score NULL on posts 2 and 5; eq(NULL, NULL) is TRUE
        let q = db
            .catalog()
            .query(posts)
            .filter(|h| h.get("score").eq(Literal::null()))
            .map(|h| h.get("title").expr());
        let rows = interpret(&q, &db).unwrap();
        assert_eq!(titles(&rows), vec!["rust", "C++"]);

        let (db, _, posts) = blog_db();
        let q = db
            .catalog()
            .query(posts)
            .filter(|h| h.get("score").ne(Literal::null()))
            .map(|h| h.get("title").expr());
        let rows = interpret(&q, &db).unwrap();
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn test_order_by_desc_with_nulls_last() {
        let (db, _, posts) = blog_db();
        // Default placement: NULLs last when descending
        let q = db
            .catalog()
            .query(posts)
            .order_by_desc(|h| h.get("score").expr())
            .map(|h| h.get("title").expr());
        let rows = interpret(&q, &db).unwrap();
        assert_eq!(
            titles(&rows),
            vec!["TypeScript", "Python", "Ruby", "C#", "rust", "C++"]
        );
    }

    #[test]
    fn test_pagination_composes() {
        let (db, _, posts) = blog_db();
        let base = |db: &Database| {
            db.catalog()
                .query(posts)
                .order_by_asc(|h| h.get("id").expr())
                .map(|h| h.get("id").expr())
        };
        let twice = interpret(&base(&db).limit_offset(3, 2).limit_offset(1, 2), &db).unwrap();
        let once = interpret(&base(&db).limit_offset(1, 4), &db).unwrap();
        assert_eq!(twice, once);
        assert_eq!(twice[0][names::SCALAR_COLUMN], Value::Int(5));
    }

    #[test]
    fn test_concat_preserves_order() {
        let (db, _, posts) = blog_db();
        let asc = db
            .catalog()
            .query(posts)
            .order_by_asc(|h| h.get("id").expr())
            .map(|h| h.get("id").expr());
        let desc = db
            .catalog()
            .query(posts)
            .order_by_desc(|h| h.get("id").expr())
            .map(|h| h.get("id").expr());
        let rows = interpret(&asc.concat(desc), &db).unwrap();
        let ids: Vec<Value> = rows
            .iter()
            .map(|r| r[names::SCALAR_COLUMN].clone())
            .collect();
        let expected: Vec<Value> = [1, 2, 3, 4, 5, 6, 6, 5, 4, 3, 2, 1]
            .into_iter()
            .map(Value::Int)
            .collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_union_dedups_intersect_and_except() {
        let (db, _, posts) = blog_db();
        let authors = |db: &Database| {
            db.catalog().query(posts).map(|h| h.get("author_id").expr())
        };
        let union = interpret(&authors(&db).union(authors(&db)), &db).unwrap();
        assert_eq!(union.len(), 3);

        let low = db
            .catalog()
            .query(posts)
            .filter(|h| h.get("id").le(3i64))
            .map(|h| h.get("author_id").expr());
        let intersect = interpret(&authors(&db).intersect(low), &db).unwrap();
        assert_eq!(intersect.len(), 1);

        let low = db
            .catalog()
            .query(posts)
            .filter(|h| h.get("id").le(3i64))
            .map(|h| h.get("author_id").expr());
        let except = interpret(&authors(&db).except(low), &db).unwrap();
        assert_eq!(except.len(), 2);
    }

    #[test]
    fn test_combine_shape_mismatch_rejected() {
        let (db, users, posts) = blog_db();
        let left = db.catalog().query(users);
        let right = db.catalog().query(posts);
        let err = interpret(&left.combine(CombineKind::Union, right), &db).unwrap_err();
        assert!(matches!(err, InterpError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_unique() {
        let (db, _, posts) = blog_db();
        let q = db
            .catalog()
            .query(posts)
            .map(|h| h.get("author_id").expr())
            .unique();
        let rows = interpret(&q, &db).unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_correlated_children_terminators() {
        let (db, users, _) = blog_db();
        let q = db.catalog().query(users).map_object(|h| {
            vec![
                ("name", h.get("name").expr()),
                ("post_count", h.children("posts").size()),
                (
                    "best",
                    h.children("posts").map(|p| p.get("score").expr()).max(),
                ),
            ]
        });
        let rows = interpret(&q, &db).unwrap();
        assert_eq!(rows[0]["post_count"], Value::Int(3));
        assert_eq!(rows[0]["best"], Value::Int(10));
        assert_eq!(rows[2]["post_count"], Value::Int(1));
    }

    #[test]
    fn test_mean_is_sum_over_count_of_non_null() {
        let (db, _, posts) = blog_db();
        // scores 10, 4, 7, 9; NULLs excluded from both sum and count
        let q = db
            .catalog()
            .query(posts)
            .map(|h| h.get("score").expr())
            .mean();
        let q = db.catalog().query(posts).limit(1).map(move |_| q.clone());
        let rows = interpret(&q, &db).unwrap();
        assert_eq!(rows[0][names::SCALAR_COLUMN], Value::Float(7.5));
    }

    #[test]
    fn test_first_and_empty_aggregates() {
        let (db, _, posts) = blog_db();
        let none = db
            .catalog()
            .query(posts)
            .filter(|h| h.get("id").gt(100i64))
            .map(|h| h.get("score").expr());
        let q = db.catalog().query(posts).limit(1).map_object(move |_| {
            vec![
                ("first", none.clone().first()),
                ("sum", none.clone().sum()),
                ("some", none.clone().some()),
                ("empty", none.empty()),
            ]
        });
        let rows = interpret(&q, &db).unwrap();
        assert_eq!(rows[0]["first"], Value::Null);
        assert_eq!(rows[0]["sum"], Value::Null);
        assert_eq!(rows[0]["some"], Value::Bool(false));
        assert_eq!(rows[0]["empty"], Value::Bool(true));
    }

    #[test]
    fn test_full_join_ordering() {
        let mut builder = Catalog::builder();
        let comments = builder.table(
            "comments",
            Schema::new(vec![
                Field::new("id", ScalarType::new(BaseType::I64)),
                Field::new("parent_id", ScalarType::nullable(BaseType::I64)),
            ]),
        );
        let catalog = builder.finish().unwrap();
        let mut db = Database::new(catalog);
        for (id, parent) in [(1, Value::Null), (2, Value::Int(1)), (3, Value::Int(9))] {
            db.insert(comments, &[("id", Value::Int(id)), ("parent_id", parent)])
                .unwrap();
        }
        let q = db.catalog().query(comments).join_on(
            JoinKind::Full,
            db.catalog().query(comments),
            |child, parent| child.get("parent_id").eq(parent.get("id").expr()),
            |child, parent| {
                vec![
                    ("child", child.get("id").expr()),
                    ("parent", parent.get("id").expr()),
                ]
            },
        );
        let rows = interpret(&q, &db).unwrap();
        let pairs: Vec<(Value, Value)> = rows
            .iter()
            .map(|r| (r["child"].clone(), r["parent"].clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                // the single inner match
                (Value::Int(2), Value::Int(1)),
                // unmatched left rows in source order
                (Value::Int(1), Value::Null),
                (Value::Int(3), Value::Null),
                // unmatched right rows in source order
                (Value::Null, Value::Int(2)),
                (Value::Null, Value::Int(3)),
            ]
        );
    }

    #[test]
    fn test_flat_map_concatenates_per_row() {
        let (db, users, _) = blog_db();
        let q = db.catalog().query(users).flat_map(|h| {
            h.children("posts").map(|p| p.get("title").expr())
        });
        let rows = interpret(&q, &db).unwrap();
        assert_eq!(rows.len(), 6);
    }

    #[test]
    fn test_group_by_refused() {
        let (db, _, posts) = blog_db();
        let q = db.catalog().query(posts).group_by(
            |h| vec![h.get("author_id").expr()],
            |h| vec![("author", h.get("author_id").expr())],
        );
        assert_eq!(interpret(&q, &db).unwrap_err(), InterpError::GroupByUnsupported);
    }

    #[test]
    fn test_raw_view_refused() {
        let (db, _, _) = blog_db();
        let q = db.catalog().view(
            algebra::SqlTemplate::verbatim("SELECT 1 AS n"),
            Schema::new(vec![Field::new("n", ScalarType::new(BaseType::I64))]),
        );
        assert_eq!(interpret(&q, &db).unwrap_err(), InterpError::RawSqlUnsupported);
    }

    #[test]
    fn test_in_with_null_operand_is_false() {
        let (db, _, posts) = blog_db();
        let array = Literal::array(vec![Literal::i64(4), Literal::i64(7)]).unwrap();
        let q = db
            .catalog()
            .query(posts)
            .order_by_asc(|h| h.get("id").expr())
            .map(move |h| h.get("score").expr().in_array(array));
        let rows = interpret(&q, &db).unwrap();
        let hits: Vec<Value> = rows
            .iter()
            .map(|r| r[names::SCALAR_COLUMN].clone())
            .collect();
        assert_eq!(
            hits,
            vec![
                Value::Bool(false),
                Value::Bool(false), // NULL score answers false, not NULL
                Value::Bool(true),
                Value::Bool(true),
                Value::Bool(false),
                Value::Bool(false),
            ]
        );
    }

    #[test]
    fn test_like_is_ascii_case_insensitive() {
        let (db, _, posts) = blog_db();
        let q = db
            .catalog()
            .query(posts)
            .filter(|h| h.get("title").like("c%"))
            .map(|h| h.get("title").expr());
        let rows = interpret(&q, &db).unwrap();
        assert_eq!(titles(&rows), vec!["C#", "C++"]);
    }

    #[test]
    fn test_division_by_zero_is_null() {
        let (db, _, posts) = blog_db();
        let q = db
            .catalog()
            .query(posts)
            .limit(1)
            .map(|h| h.get("id").expr().div(0i64));
        let rows = interpret(&q, &db).unwrap();
        assert_eq!(rows[0][names::SCALAR_COLUMN], Value::Null);
    }
}
