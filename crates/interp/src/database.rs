use std::collections::{BTreeMap, HashMap};

use algebra::{Catalog, TableId};
use scalar::Value;

use crate::error::InterpError;

/// One flat row: column alias to value. Table rows use plain field names;
/// projected rows use flattened prop-path aliases.
pub type Row = BTreeMap<String, Value>;

/// An in-memory table set for a catalog. Rows are validated and coerced
/// against the table schema on insert, so evaluation never meets a value of
/// the wrong type.
#[derive(Debug, Clone)]
pub struct Database {
    catalog: Catalog,
    tables: HashMap<TableId, Vec<Row>>,
}

impl Database {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            tables: HashMap::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Insert one row. Named fields are coerced to their declared types;
    /// omitted nullable fields become NULL, omitted non-nullable fields are
    /// an error.
    pub fn insert(&mut self, table: TableId, values: &[(&str, Value)]) -> Result<(), InterpError> {
        let def = self.catalog.table_def(table).clone();
        let mut row = Row::new();
        for (name, value) in values {
            let field = def
                .schema
                .field(name)
                .ok_or_else(|| InterpError::UnknownField {
                    table: def.name.clone(),
                    field: name.to_string(),
                })?;
            row.insert(field.name.clone(), value.coerce(&field.ty)?);
        }
        for field in &def.schema.fields {
            if !row.contains_key(&field.name) {
                if field.ty.nullable {
                    row.insert(field.name.clone(), Value::Null);
                } else {
                    return Err(InterpError::MissingField {
                        table: def.name.clone(),
                        field: field.name.clone(),
                    });
                }
            }
        }
        self.tables.entry(table).or_default().push(row);
        Ok(())
    }

    pub fn rows(&self, table: TableId) -> &[Row] {
        self.tables.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use algebra::{Field, Schema};
    use scalar::{BaseType, ScalarType};

    fn catalog() -> (Catalog, TableId) {
        let mut builder = Catalog::builder();
        let t = builder.table(
            "things",
            Schema::new(vec![
                Field::new("id", ScalarType::new(BaseType::I64)),
                Field::new("label", ScalarType::nullable(BaseType::Text)),
            ]),
        );
        (builder.finish().unwrap(), t)
    }

    #[test]
    fn test_insert_fills_nullable_fields() {
        let (catalog, t) = catalog();
        let mut db = Database::new(catalog);
        db.insert(t, &[("id", Value::Int(1))]).unwrap();
        assert_eq!(db.rows(t)[0]["label"], Value::Null);
    }

    #[test]
    fn test_insert_rejects_missing_required_field() {
        let (catalog, t) = catalog();
        let mut db = Database::new(catalog);
        let err = db
            .insert(t, &[("label", Value::Text("x".into()))])
            .unwrap_err();
        assert_eq!(
            err,
            InterpError::MissingField {
                table: "things".into(),
                field: "id".into(),
            }
        );
    }

    #[test]
    fn test_insert_coerces_wire_values() {
        let (catalog, t) = catalog();
        let mut db = Database::new(catalog);
        db.insert(t, &[("id", Value::Text("7".into()))]).unwrap();
        assert_eq!(db.rows(t)[0]["id"], Value::Int(7));
    }

    #[test]
    fn test_insert_rejects_unknown_field() {
        let (catalog, t) = catalog();
        let mut db = Database::new(catalog);
        assert!(matches!(
            db.insert(t, &[("id", Value::Int(1)), ("nope", Value::Int(2))]),
            Err(InterpError::UnknownField { .. })
        ));
    }
}
