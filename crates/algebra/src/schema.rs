//! Table schemas, relationships, and the catalog arena
//!
//! Schemas are mutually recursive (Post.author points at users, User.posts
//! points back at posts), so ref targets are integer indices into a catalog
//! arena rather than direct references. Slots are reserved first and defined
//! afterwards, which breaks the cycle without closures or laziness.

use std::sync::Arc;

use scalar::ScalarType;

/// A named scalar column of a table or view
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: ScalarType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: ScalarType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Join condition of a relationship: AND-ed equality pairs of
/// `(local field, target field)` names.
#[derive(Debug, Clone, PartialEq)]
pub struct RefCondition {
    pub pairs: Vec<(String, String)>,
}

impl RefCondition {
    /// Single-pair condition `local = target`
    pub fn eq(local: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            pairs: vec![(local.into(), target.into())],
        }
    }
}

/// A relationship edge of a schema
#[derive(Debug, Clone, PartialEq)]
pub enum Ref {
    /// Zero-or-one related row (n x 1). Nullable when the local key may be
    /// NULL, in which case locators through it compile to a LEFT join.
    Forward {
        name: String,
        target: TableId,
        on: RefCondition,
        nullable: bool,
    },
    /// Zero-or-many related rows (1 x n). Never nullable itself; absence is
    /// an empty list.
    Back {
        name: String,
        target: TableId,
        on: RefCondition,
    },
}

impl Ref {
    pub fn name(&self) -> &str {
        match self {
            Ref::Forward { name, .. } => name,
            Ref::Back { name, .. } => name,
        }
    }

    pub fn target(&self) -> TableId {
        match self {
            Ref::Forward { target, .. } => *target,
            Ref::Back { target, .. } => *target,
        }
    }

    pub fn condition(&self) -> &RefCondition {
        match self {
            Ref::Forward { on, .. } => on,
            Ref::Back { on, .. } => on,
        }
    }
}

/// Immutable field + relationship list of one table or view
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub fields: Vec<Field>,
    pub refs: Vec<Ref>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            refs: Vec::new(),
        }
    }

    pub fn with_refs(fields: Vec<Field>, refs: Vec<Ref>) -> Self {
        Self { fields, refs }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn ref_by_name(&self, name: &str) -> Option<&Ref> {
        self.refs.iter().find(|r| r.name() == name)
    }
}

/// Index of a table slot in the catalog arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(pub(crate) usize);

/// A defined table: its SQL name plus its schema
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub schema: Schema,
}

#[derive(Debug)]
struct CatalogInner {
    tables: Vec<TableDef>,
}

/// The immutable arena of table definitions. Cheap to clone; every `Query`
/// carries one so ref targets can be resolved anywhere in the pipeline.
#[derive(Debug, Clone)]
pub struct Catalog(Arc<CatalogInner>);

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder { slots: Vec::new() }
    }

    pub fn table_def(&self, id: TableId) -> &TableDef {
        &self.0.tables[id.0]
    }

    pub fn tables(&self) -> impl Iterator<Item = (TableId, &TableDef)> {
        self.0.tables.iter().enumerate().map(|(i, t)| (TableId(i), t))
    }
}

/// Two-phase catalog construction: reserve slots for every table first, then
/// define each one; refs between them use the reserved ids.
pub struct CatalogBuilder {
    slots: Vec<Option<TableDef>>,
}

impl CatalogBuilder {
    /// Reserve a slot, returning the id other schemas can point at.
    pub fn reserve(&mut self) -> TableId {
        self.slots.push(None);
        TableId(self.slots.len() - 1)
    }

    /// Define a previously reserved slot.
    pub fn define(&mut self, id: TableId, name: impl Into<String>, schema: Schema) {
        self.slots[id.0] = Some(TableDef {
            name: name.into(),
            schema,
        });
    }

    /// Reserve and define in one step, for tables without incoming refs.
    pub fn table(&mut self, name: impl Into<String>, schema: Schema) -> TableId {
        let id = self.reserve();
        self.define(id, name, schema);
        id
    }

    /// Validate every definition and freeze the catalog.
    pub fn finish(self) -> Result<Catalog, SchemaError> {
        let mut tables = Vec::with_capacity(self.slots.len());
        for (index, slot) in self.slots.iter().enumerate() {
            match slot {
                Some(def) => tables.push(def.clone()),
                None => return Err(SchemaError::UndefinedSlot { index }),
            }
        }
        for def in &tables {
            if def.schema.fields.is_empty() {
                return Err(SchemaError::EmptySchema {
                    table: def.name.clone(),
                });
            }
            let mut seen = std::collections::HashSet::new();
            for field in &def.schema.fields {
                if !seen.insert(field.name.as_str()) {
                    return Err(SchemaError::DuplicateName {
                        table: def.name.clone(),
                        name: field.name.clone(),
                    });
                }
            }
            for r in &def.schema.refs {
                if !seen.insert(r.name()) {
                    return Err(SchemaError::DuplicateName {
                        table: def.name.clone(),
                        name: r.name().to_string(),
                    });
                }
                if r.target().0 >= tables.len() {
                    return Err(SchemaError::DanglingRef {
                        table: def.name.clone(),
                        ref_name: r.name().to_string(),
                    });
                }
                let target = &tables[r.target().0];
                for (local, foreign) in &r.condition().pairs {
                    if def.schema.field(local).is_none() {
                        return Err(SchemaError::UnknownConditionField {
                            table: def.name.clone(),
                            ref_name: r.name().to_string(),
                            field: local.clone(),
                        });
                    }
                    if target.schema.field(foreign).is_none() {
                        return Err(SchemaError::UnknownConditionField {
                            table: target.name.clone(),
                            ref_name: r.name().to_string(),
                            field: foreign.clone(),
                        });
                    }
                }
            }
        }
        Ok(Catalog(Arc::new(CatalogInner { tables })))
    }
}

/// Construction-time schema contract violation
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// A reserved slot was never defined
    UndefinedSlot { index: usize },
    /// A table schema has no fields
    EmptySchema { table: String },
    /// Field and ref names of a table must be unique together
    DuplicateName { table: String, name: String },
    /// A ref points at a slot outside the catalog
    DanglingRef { table: String, ref_name: String },
    /// A ref condition names a field missing from its schema
    UnknownConditionField {
        table: String,
        ref_name: String,
        field: String,
    },
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaError::UndefinedSlot { index } => {
                write!(f, "reserved table slot {} was never defined", index)
            }
            SchemaError::EmptySchema { table } => {
                write!(f, "table {} has an empty schema", table)
            }
            SchemaError::DuplicateName { table, name } => {
                write!(f, "duplicate field or ref name {} in table {}", name, table)
            }
            SchemaError::DanglingRef { table, ref_name } => {
                write!(f, "ref {} of table {} targets an undefined slot", ref_name, table)
            }
            SchemaError::UnknownConditionField {
                table,
                ref_name,
                field,
            } => write!(
                f,
                "ref {} condition names unknown field {} of table {}",
                ref_name, field, table
            ),
        }
    }
}

impl std::error::Error for SchemaError {}

#[cfg(test)]
mod tests {
    use super::*;
    use scalar::{BaseType, ScalarType};

    fn int() -> ScalarType {
        ScalarType::new(BaseType::I64)
    }

    #[test]
    fn test_mutually_recursive_schemas() {
        let mut builder = Catalog::builder();
        let users = builder.reserve();
        let posts = builder.reserve();
        builder.define(
            users,
            "users",
            Schema::with_refs(
                vec![Field::new("id", int())],
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
                vec![Field::new("id", int()), Field::new("author_id", int())],
                vec![Ref::Forward {
                    name: "author".to_string(),
                    target: users,
                    on: RefCondition::eq("author_id", "id"),
                    nullable: false,
                }],
            ),
        );
        let catalog = builder.finish().unwrap();
        assert_eq!(catalog.table_def(posts).name, "posts");
        assert_eq!(
            catalog.table_def(users).schema.refs[0].target(),
            posts
        );
    }

    #[test]
    fn test_empty_schema_rejected() {
        let mut builder = Catalog::builder();
        builder.table("empty", Schema::new(vec![]));
        assert_eq!(
            builder.finish().unwrap_err(),
            SchemaError::EmptySchema {
                table: "empty".to_string()
            }
        );
    }

    #[test]
    fn test_undefined_slot_rejected() {
        let mut builder = Catalog::builder();
        let _dangling = builder.reserve();
        assert_eq!(
            builder.finish().unwrap_err(),
            SchemaError::UndefinedSlot { index: 0 }
        );
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let mut builder = Catalog::builder();
        builder.table(
            "t",
            Schema::new(vec![Field::new("x", int()), Field::new("x", int())]),
        );
        assert!(matches!(
            builder.finish(),
            Err(SchemaError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_condition_field_checked() {
        let mut builder2 = Catalog::builder();
        let users2 = builder2.reserve();
        builder2.define(
            users2,
            "users",
            Schema::with_refs(
                vec![Field::new("id", int())],
                vec![Ref::Forward {
                    name: "self_ref".to_string(),
                    target: users2,
                    on: RefCondition::eq("missing", "id"),
                    nullable: true,
                }],
            ),
        );
        assert!(matches!(
            builder2.finish(),
            Err(SchemaError::UnknownConditionField { .. })
        ));
    }
}
