//! End-to-end checks of specific behaviors against a live SQLite database.

use algebra::JoinKind;
use relq::{Connector, Options};
use relq_tests::{assert_differential, blog_fixture, sqlite_fixture};
use scalar::Literal;
use serde_json::json;
use sqltree::{RenderOptions, SqliteDialect};

fn sorted_rows(rows: &[relq::FlatRow]) -> Vec<String> {
    let mut keys: Vec<String> = rows.iter().map(|row| format!("{:?}", row)).collect();
    keys.sort();
    keys
}

#[test]
fn test_fixture_datasets_agree() {
    let fixture = blog_fixture();
    let mut connector = sqlite_fixture();
    // full-table scans pin the SQLite seed to the interpreter rows, column
    // for column, so the two fixtures cannot drift apart
    let posts = fixture
        .catalog
        .query(fixture.posts)
        .order_by_asc(|h| h.get("id").expr());
    assert_differential(&posts, &fixture, &mut connector);
    let users = fixture
        .catalog
        .query(fixture.users)
        .order_by_asc(|h| h.get("id").expr());
    assert_differential(&users, &fixture, &mut connector);
}

#[test]
fn test_order_limit_map_round_trip() {
    let fixture = blog_fixture();
    let mut connector = sqlite_fixture();
    let q = fixture
        .catalog
        .query(fixture.posts)
        .order_by_asc(|h| h.get("id").expr())
        .limit(3)
        .map(|h| h.get("title").expr());
    let rows = relq::fetch(&mut connector, &q).unwrap();
    assert_eq!(rows, vec![json!("TypeScript"), json!("rust"), json!("C#")]);
}

#[test]
fn test_forward_ref_walk_round_trip() {
    let fixture = blog_fixture();
    let mut connector = sqlite_fixture();
    let q = fixture
        .catalog
        .query(fixture.posts)
        .filter(|h| h.get("author").get("name").eq("ada"))
        .order_by_asc(|h| h.get("id").expr())
        .map(|h| h.get("title").expr());
    let rows = relq::fetch(&mut connector, &q).unwrap();
    assert_eq!(rows, vec![json!("TypeScript"), json!("rust"), json!("C#")]);
    assert_differential(&q, &fixture, &mut connector);
}

#[test]
fn test_null_safe_equality_against_sqlite() {
    let fixture = blog_fixture();
    let mut connector = sqlite_fixture();
    // two posts carry a NULL score; `ne` must keep them, `eq` must not
    let ne = fixture
        .catalog
        .query(fixture.posts)
        .filter(|h| h.get("score").ne(9i64))
        .order_by_asc(|h| h.get("id").expr())
        .map(|h| h.get("id").expr());
    let rows = relq::fetch(&mut connector, &ne).unwrap();
    assert_eq!(rows, vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);
    assert_differential(&ne, &fixture, &mut connector);

    let eq_null = fixture
        .catalog
        .query(fixture.posts)
        .filter(|h| h.get("score").eq(Literal::null()))
        .order_by_asc(|h| h.get("id").expr())
        .map(|h| h.get("id").expr());
    let rows = relq::fetch(&mut connector, &eq_null).unwrap();
    assert_eq!(rows, vec![json!(2), json!(5)]);
    assert_differential(&eq_null, &fixture, &mut connector);
}

#[test]
fn test_membership_with_null_operand_is_false() {
    let fixture = blog_fixture();
    let mut connector = sqlite_fixture();
    let members = Literal::array(vec![Literal::i64(4), Literal::i64(9)]).unwrap();
    let q = fixture
        .catalog
        .query(fixture.posts)
        .filter(|h| h.get("score").expr().in_array(members))
        .order_by_asc(|h| h.get("id").expr())
        .map(|h| h.get("title").expr());
    let rows = relq::fetch(&mut connector, &q).unwrap();
    assert_eq!(rows, vec![json!("C#"), json!("Python")]);
    assert_differential(&q, &fixture, &mut connector);
}

#[test]
fn test_pagination_composes_against_sqlite() {
    let fixture = blog_fixture();
    let mut connector = sqlite_fixture();
    // window 3..5 of the id ordering, then row 1 of that window
    let q = fixture
        .catalog
        .query(fixture.posts)
        .order_by_asc(|h| h.get("id").expr())
        .limit_offset(3, 2)
        .limit_offset(1, 2)
        .map(|h| h.get("id").expr());
    let rows = relq::fetch(&mut connector, &q).unwrap();
    assert_eq!(rows, vec![json!(5)]);
    assert_differential(&q, &fixture, &mut connector);
}

#[test]
fn test_concat_preserves_operand_order() {
    let fixture = blog_fixture();
    let mut connector = sqlite_fixture();
    let asc = fixture
        .catalog
        .query(fixture.posts)
        .order_by_asc(|h| h.get("id").expr());
    let desc = fixture
        .catalog
        .query(fixture.posts)
        .order_by_desc(|h| h.get("id").expr());
    let q = asc.concat(desc).map(|h| h.get("id").expr());
    let rows = relq::fetch(&mut connector, &q).unwrap();
    let ids: Vec<i64> = rows.iter().map(|v| v.as_i64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 6, 5, 4, 3, 2, 1]);
    assert_differential(&q, &fixture, &mut connector);
}

#[test]
fn test_union_deduplicates_against_sqlite() {
    let fixture = blog_fixture();
    let mut connector = sqlite_fixture();
    let ada = fixture
        .catalog
        .query(fixture.posts)
        .filter(|h| h.get("author_id").eq(1i64));
    let low = fixture
        .catalog
        .query(fixture.posts)
        .filter(|h| h.get("score").lt(8i64));
    let q = ada
        .union(low)
        .order_by_asc(|h| h.get("id").expr())
        .map(|h| h.get("id").expr());
    let rows = relq::fetch(&mut connector, &q).unwrap();
    assert_eq!(rows, vec![json!(1), json!(2), json!(3), json!(4)]);
}

#[test]
fn test_like_is_case_insensitive() {
    let fixture = blog_fixture();
    let mut connector = sqlite_fixture();
    let q = fixture
        .catalog
        .query(fixture.posts)
        .filter(|h| h.get("title").like("c%"))
        .order_by_asc(|h| h.get("id").expr())
        .map(|h| h.get("title").expr());
    let rows = relq::fetch(&mut connector, &q).unwrap();
    assert_eq!(rows, vec![json!("C#"), json!("C++")]);
    assert_differential(&q, &fixture, &mut connector);
}

#[test]
fn test_optimizer_does_not_change_results() {
    let fixture = blog_fixture();
    let mut connector = sqlite_fixture();
    let q = fixture
        .catalog
        .query(fixture.posts)
        .filter(|h| h.get("score").ge(4i64))
        .filter(|h| h.get("author_id").ne(2i64))
        .order_by_desc(|h| h.get("score").expr())
        .map(|h| h.get("title").expr());
    let raw = relq::fetch_with(
        &mut connector,
        &q,
        &Options {
            optimize: false,
            render: RenderOptions::default(),
        },
    )
    .unwrap();
    let optimized = relq::fetch(&mut connector, &q).unwrap();
    assert_eq!(raw, optimized);
    assert_eq!(
        optimized,
        vec![json!("TypeScript"), json!("Python"), json!("C#")]
    );
}

#[test]
fn test_filtered_side_survives_full_join_optimization() {
    let fixture = blog_fixture();
    let mut connector = sqlite_fixture();
    let users = fixture.catalog.query(fixture.users);
    let q = fixture
        .catalog
        .query(fixture.posts)
        .filter(|h| h.get("author_id").eq(1i64))
        .join_on(
            JoinKind::Full,
            users,
            |post, user| post.get("author_id").eq(user.get("id").expr()),
            |post, user| {
                vec![
                    ("title", post.get("title").expr()),
                    ("name", user.get("name").expr()),
                ]
            },
        );
    let raw = relq::sql_for(
        &q,
        &SqliteDialect,
        &Options {
            optimize: false,
            render: RenderOptions::default(),
        },
    )
    .unwrap();
    let optimized = relq::sql_for(&q, &SqliteDialect, &Options::default()).unwrap();
    let raw_rows = connector.query(&raw.sql, &raw.args).unwrap();
    let optimized_rows = connector.query(&optimized.sql, &optimized.args).unwrap();
    // the author filter must run before the FULL join: three ada posts
    // match her row, and brian and grace survive with a NULL title
    assert_eq!(raw_rows.len(), 5);
    assert_eq!(sorted_rows(&optimized_rows), sorted_rows(&raw_rows));
}

#[test]
fn test_nested_object_rows_from_sqlite() {
    let fixture = blog_fixture();
    let mut connector = sqlite_fixture();
    let q = fixture
        .catalog
        .query(fixture.posts)
        .filter(|h| h.get("id").eq(6i64))
        .map_object(|h| {
            vec![
                ("title", h.get("title").expr()),
                ("author.name", h.get("author").get("name").expr()),
            ]
        });
    let rows = relq::fetch(&mut connector, &q).unwrap();
    assert_eq!(
        rows,
        vec![json!({"title": "Python", "author": {"name": "grace"}})]
    );
}
