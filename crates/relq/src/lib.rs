//! Typed query algebra to SQL, end to end.
//!
//! The pipeline is compile, then optionally optimize, then render for a
//! dialect; a driver implementing [`Connector`] executes the text and the
//! flat rows come back through [`materialize`] in the projected shape.

pub mod connector;
pub mod error;
pub mod materialize;

pub use algebra;
pub use compiler;
pub use optimizer;
pub use scalar;
pub use sqltree;

pub use connector::{Connector, ConnectorError, FlatRow};
pub use error::Error;
pub use materialize::{materialize, MaterializeError};

use algebra::Query;
use serde_json::Value as JsonValue;
use sqltree::{render, Dialect, RenderOptions, RenderedSql};

/// Pipeline switches.
#[derive(Debug, Clone)]
pub struct Options {
    /// Run the SQL tree optimizer before rendering
    pub optimize: bool,
    pub render: RenderOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            optimize: true,
            render: RenderOptions::default(),
        }
    }
}

/// Compile a query down to SQL text and arguments for one dialect.
pub fn sql_for(
    query: &Query,
    dialect: &dyn Dialect,
    options: &Options,
) -> Result<RenderedSql, Error> {
    let mut sql = compiler::compile(query)?;
    if options.optimize {
        sql = optimizer::optimize(sql);
    }
    let rendered = render(&sql, dialect, &options.render);
    tracing::debug!(dialect = dialect.name(), sql = %rendered.sql, "rendered query");
    Ok(rendered)
}

/// Run a query through a connector and materialize the projected rows.
pub fn fetch(connector: &mut dyn Connector, query: &Query) -> Result<Vec<JsonValue>, Error> {
    fetch_with(connector, query, &Options::default())
}

pub fn fetch_with(
    connector: &mut dyn Connector,
    query: &Query,
    options: &Options,
) -> Result<Vec<JsonValue>, Error> {
    let shape = query.projection.shape()?;
    let rendered = sql_for(query, connector.dialect(), options)?;
    let rows = connector.query(&rendered.sql, &rendered.args)?;
    rows.iter()
        .map(|row| materialize(row, &shape).map_err(Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use algebra::{Catalog, Field, Schema, TableId};
    use scalar::{BaseType, ScalarType, Value};
    use serde_json::json;
    use sqltree::SqliteDialect;

    fn posts() -> (Catalog, TableId) {
        let mut builder = Catalog::builder();
        let posts = builder.table(
            "posts",
            Schema::new(vec![
                Field::new("id", ScalarType::new(BaseType::I64)),
                Field::new("title", ScalarType::new(BaseType::Text)),
            ]),
        );
        (builder.finish().unwrap(), posts)
    }

    /// Canned-response driver for exercising the pipeline without a database.
    struct Canned {
        rows: Vec<FlatRow>,
        seen_sql: Vec<String>,
    }

    impl Connector for Canned {
        fn dialect(&self) -> &dyn Dialect {
            &SqliteDialect
        }

        fn query(&mut self, sql: &str, _args: &[Value]) -> Result<Vec<FlatRow>, ConnectorError> {
            self.seen_sql.push(sql.to_string());
            Ok(self.rows.clone())
        }

        fn execute(&mut self, _sql: &str) -> Result<(), ConnectorError> {
            Ok(())
        }

        fn close(self: Box<Self>) -> Result<(), ConnectorError> {
            Ok(())
        }
    }

    #[test]
    fn test_sql_for_optimized_is_flat() {
        let (catalog, posts) = posts();
        let q = catalog
            .query(posts)
            .filter(|h| h.get("id").gt(1i64))
            .map(|h| h.get("title").expr());
        let rendered = sql_for(&q, &SqliteDialect, &Options::default()).unwrap();
        assert!(!rendered.sql.contains("(SELECT"));
        assert_eq!(rendered.args, vec![Value::Int(1)]);
    }

    #[test]
    fn test_fetch_materializes_rows() {
        let (catalog, posts) = posts();
        let q = catalog.query(posts);
        let mut connector = Canned {
            rows: vec![[
                ("id".to_string(), Value::Text("1".into())),
                ("title".to_string(), Value::Text("rust".into())),
            ]
            .into_iter()
            .collect()],
            seen_sql: Vec::new(),
        };
        let rows = fetch(&mut connector, &q).unwrap();
        assert_eq!(rows, vec![json!({"id": 1, "title": "rust"})]);
        assert_eq!(connector.seen_sql.len(), 1);
    }

    #[test]
    fn test_fetch_rejects_incompatible_wire_value() {
        let (catalog, posts) = posts();
        let q = catalog.query(posts);
        let mut connector = Canned {
            rows: vec![[
                ("id".to_string(), Value::Text("not a number".into())),
                ("title".to_string(), Value::Text("rust".into())),
            ]
            .into_iter()
            .collect()],
            seen_sql: Vec::new(),
        };
        assert!(matches!(
            fetch(&mut connector, &q),
            Err(Error::Materialize(_))
        ));
    }
}
