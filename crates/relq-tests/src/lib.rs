//! Test support: a real SQLite connector plus the shared blog fixture and
//! the differential harness comparing compiled SQL against the reference
//! interpreter.

use algebra::{Catalog, Field, Query, Ref, RefCondition, Schema, TableId};
use relq::{Connector, ConnectorError, FlatRow, Options};
use scalar::{BaseType, ScalarType, Value};
use serde_json::Value as JsonValue;
use sqltree::{Dialect, RenderOptions, SqliteDialect};

/// In-process SQLite driver.
pub struct SqliteConnector {
    conn: rusqlite::Connection,
}

fn driver_err(e: impl std::fmt::Display) -> ConnectorError {
    ConnectorError::new(e.to_string())
}

impl SqliteConnector {
    pub fn open_in_memory() -> Result<Self, ConnectorError> {
        let conn = rusqlite::Connection::open_in_memory().map_err(driver_err)?;
        Ok(Self { conn })
    }
}

fn to_sqlite(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(*b as i64),
        Value::Int(n) => rusqlite::types::Value::Integer(*n),
        Value::Float(n) => rusqlite::types::Value::Real(*n),
        Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
        // the renderer expands arrays, so an array argument never reaches us
        Value::Array(_) => rusqlite::types::Value::Null,
    }
}

fn from_sqlite(value: rusqlite::types::Value) -> Value {
    match value {
        rusqlite::types::Value::Null => Value::Null,
        rusqlite::types::Value::Integer(n) => Value::Int(n),
        rusqlite::types::Value::Real(n) => Value::Float(n),
        rusqlite::types::Value::Text(s) => Value::Text(s),
        rusqlite::types::Value::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

impl Connector for SqliteConnector {
    fn dialect(&self) -> &dyn Dialect {
        &SqliteDialect
    }

    fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<FlatRow>, ConnectorError> {
        let mut stmt = self.conn.prepare(sql).map_err(driver_err)?;
        let names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        let params = rusqlite::params_from_iter(args.iter().map(to_sqlite));
        let mut rows = stmt.query(params).map_err(driver_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(driver_err)? {
            let mut flat = FlatRow::new();
            for (i, name) in names.iter().enumerate() {
                let value: rusqlite::types::Value = row.get(i).map_err(driver_err)?;
                flat.insert(name.clone(), from_sqlite(value));
            }
            out.push(flat);
        }
        Ok(out)
    }

    fn execute(&mut self, sql: &str) -> Result<(), ConnectorError> {
        self.conn.execute_batch(sql).map_err(driver_err)
    }

    fn close(self: Box<Self>) -> Result<(), ConnectorError> {
        self.conn.close().map_err(|(_, e)| driver_err(e))
    }
}

/// The shared users/posts fixture, mirrored between the in-memory
/// interpreter database and a freshly seeded SQLite file.
pub struct Fixture {
    pub catalog: Catalog,
    pub users: TableId,
    pub posts: TableId,
    pub db: interp::Database,
}

pub fn blog_fixture() -> Fixture {
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
    let catalog = builder.finish().expect("fixture catalog");

    let mut db = interp::Database::new(catalog.clone());
    for (id, name) in [(1, "ada"), (2, "brian"), (3, "grace")] {
        db.insert(
            users,
            &[("id", Value::Int(id)), ("name", Value::Text(name.into()))],
        )
        .expect("fixture user");
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
        .expect("fixture post");
    }

    Fixture {
        catalog,
        users,
        posts,
        db,
    }
}

/// A SQLite connection seeded with the same rows as the fixture database.
pub fn sqlite_fixture() -> SqliteConnector {
    let mut connector = SqliteConnector::open_in_memory().expect("open sqlite");
    connector
        .execute(
            "CREATE TABLE users (id INTEGER NOT NULL, name TEXT NOT NULL);
             CREATE TABLE posts (
                 id INTEGER NOT NULL,
                 title TEXT NOT NULL,
                 author_id INTEGER NOT NULL,
                 score INTEGER
             );
             INSERT INTO users (id, name) VALUES (1, 'ada'), (2, 'brian'), (3, 'grace');
             INSERT INTO posts (id, title, author_id, score) VALUES
                 (1, 'TypeScript', 1, 10),
                 (2, 'rust', 1, NULL),
                 (3, 'C#', 1, 4),
                 (4, 'Ruby', 2, 7),
                 (5, 'C++', 2, NULL),
                 (6, 'Python', 3, 9);",
        )
        .expect("seed sqlite");
    connector
}

/// Interpret the query in memory, then run it through SQLite in all four
/// pipeline variants (parameterized x optimized) and require every variant
/// to agree with the interpreter row for row.
pub fn assert_differential(query: &Query, fixture: &Fixture, connector: &mut SqliteConnector) {
    let shape = query.projection.shape().expect("projection shape");
    let expected: Vec<JsonValue> = interp::interpret(query, &fixture.db)
        .expect("interpret")
        .iter()
        .map(|row| relq::materialize(row, &shape).expect("materialize ground truth"))
        .collect();

    for optimize in [false, true] {
        for parameterized in [false, true] {
            let options = Options {
                optimize,
                render: RenderOptions { parameterized },
            };
            let got = relq::fetch_with(connector, query, &options).unwrap_or_else(|e| {
                panic!(
                    "pipeline failed (optimize={}, parameterized={}): {}",
                    optimize, parameterized, e
                )
            });
            assert_eq!(
                got, expected,
                "variant disagrees with interpreter (optimize={}, parameterized={})",
                optimize, parameterized
            );
        }
    }
}
