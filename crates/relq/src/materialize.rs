//! Rebuilding nested values from flat connector rows.

use algebra::{names, RowShape, ShapeKind};
use scalar::{CoerceError, Value};
use serde_json::{Map, Value as JsonValue};

use crate::connector::FlatRow;

/// A flat row could not be turned back into the projected shape.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterializeError {
    /// The row lacks a column the projection promises
    MissingColumn { column: String },
    /// A wire value is incompatible with the declared scalar type
    Coerce(CoerceError),
}

impl std::fmt::Display for MaterializeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaterializeError::MissingColumn { column } => {
                write!(f, "result row lacks column {}", column)
            }
            MaterializeError::Coerce(e) => write!(f, "materialization failed: {}", e),
        }
    }
}

impl std::error::Error for MaterializeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MaterializeError::Coerce(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CoerceError> for MaterializeError {
    fn from(e: CoerceError) -> Self {
        MaterializeError::Coerce(e)
    }
}

/// Rebuild the nested value a projection describes from one flat row.
///
/// Wire-level 0/1 booleans and numeric strings are coerced back to native
/// types; any other mismatch, or a NULL in a non-nullable column, is a hard
/// error. Internal helper columns in the row are ignored.
pub fn materialize(row: &FlatRow, shape: &RowShape) -> Result<JsonValue, MaterializeError> {
    match &shape.kind {
        ShapeKind::Scalar(ty) => {
            let value = row
                .get(names::SCALAR_COLUMN)
                .ok_or_else(|| MaterializeError::MissingColumn {
                    column: names::SCALAR_COLUMN.to_string(),
                })?;
            Ok(to_json(&value.coerce(ty)?))
        }
        ShapeKind::Object(columns) => {
            let mut root = Map::new();
            for (path, ty) in columns {
                let alias = names::column_alias(path);
                let value = row
                    .get(&alias)
                    .ok_or(MaterializeError::MissingColumn { column: alias })?;
                let coerced = value.coerce(ty)?;
                insert_path(&mut root, path, to_json(&coerced));
            }
            Ok(JsonValue::Object(root))
        }
    }
}

fn insert_path(map: &mut Map<String, JsonValue>, path: &[String], value: JsonValue) {
    if path.len() == 1 {
        map.insert(path[0].clone(), value);
        return;
    }
    let entry = map
        .entry(path[0].clone())
        .or_insert_with(|| JsonValue::Object(Map::new()));
    if let JsonValue::Object(inner) = entry {
        insert_path(inner, &path[1..], value);
    }
}

fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(n) => JsonValue::Number((*n).into()),
        Value::Float(n) => serde_json::Number::from_f64(*n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Text(s) => JsonValue::String(s.clone()),
        Value::Array(items) => JsonValue::Array(items.iter().map(to_json).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scalar::{BaseType, ScalarType};
    use serde_json::json;

    fn row(entries: &[(&str, Value)]) -> FlatRow {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_scalar_shape() {
        let shape = RowShape {
            kind: ShapeKind::Scalar(ScalarType::new(BaseType::I64)),
        };
        let row = row(&[(names::SCALAR_COLUMN, Value::Int(7))]);
        assert_eq!(materialize(&row, &shape).unwrap(), json!(7));
    }

    #[test]
    fn test_nested_paths_rebuild_objects() {
        let shape = RowShape {
            kind: ShapeKind::Object(vec![
                (vec!["id".into()], ScalarType::new(BaseType::I64)),
                (
                    vec!["author".into(), "name".into()],
                    ScalarType::new(BaseType::Text),
                ),
            ]),
        };
        let row = row(&[
            ("id", Value::Int(1)),
            ("author$$name", Value::Text("ada".into())),
        ]);
        assert_eq!(
            materialize(&row, &shape).unwrap(),
            json!({"id": 1, "author": {"name": "ada"}})
        );
    }

    #[test]
    fn test_wire_boolean_coerced() {
        let shape = RowShape {
            kind: ShapeKind::Object(vec![(
                vec!["done".into()],
                ScalarType::new(BaseType::Bool),
            )]),
        };
        let row = row(&[("done", Value::Int(1))]);
        assert_eq!(materialize(&row, &shape).unwrap(), json!({"done": true}));
    }

    #[test]
    fn test_unexpected_null_rejected() {
        let shape = RowShape {
            kind: ShapeKind::Object(vec![(
                vec!["id".into()],
                ScalarType::new(BaseType::I64),
            )]),
        };
        let row = row(&[("id", Value::Null)]);
        assert!(matches!(
            materialize(&row, &shape),
            Err(MaterializeError::Coerce(_))
        ));
    }

    #[test]
    fn test_system_columns_ignored() {
        let shape = RowShape {
            kind: ShapeKind::Object(vec![(
                vec!["id".into()],
                ScalarType::new(BaseType::I64),
            )]),
        };
        let row = row(&[
            ("id", Value::Int(3)),
            ("$sys$ord$0", Value::Int(99)),
        ]);
        assert_eq!(materialize(&row, &shape).unwrap(), json!({"id": 3}));
    }

    #[test]
    fn test_missing_column_rejected() {
        let shape = RowShape {
            kind: ShapeKind::Object(vec![(
                vec!["id".into()],
                ScalarType::new(BaseType::I64),
            )]),
        };
        let row = row(&[]);
        assert_eq!(
            materialize(&row, &shape).unwrap_err(),
            MaterializeError::MissingColumn {
                column: "id".into()
            }
        );
    }
}
