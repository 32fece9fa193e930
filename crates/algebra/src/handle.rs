//! Handles: explicit path builders over a query source
//!
//! A handle is a small `{root, path}` value handed to builder closures.
//! `get` extends the path through fields and forward refs; `children` opens
//! a correlated sub-query through a back ref.

use crate::expr::Expr;
use crate::query::{Query, QuerySource, SourceKind};
use crate::schema::Ref;

/// A path into a query source
#[derive(Debug, Clone)]
pub struct Handle {
    root: QuerySource,
    path: Vec<String>,
}

impl Handle {
    pub fn root(source: QuerySource) -> Self {
        Self {
            root: source,
            path: Vec::new(),
        }
    }

    pub fn source(&self) -> &QuerySource {
        &self.root
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Extend the path by a field or forward-ref name. Unknown names
    /// surface as type errors when the expression is compiled.
    pub fn get(&self, name: &str) -> Handle {
        let mut path = self.path.clone();
        path.push(name.to_string());
        Handle {
            root: self.root.clone(),
            path,
        }
    }

    /// The handle as a scalar expression. With an empty path this denotes
    /// the value of a scalar-projected source.
    pub fn expr(&self) -> Expr {
        Expr::Locator {
            root: self.root.clone(),
            path: self.path.clone(),
        }
    }

    /// Alias of `expr` that reads better on scalar sources.
    pub fn value(&self) -> Expr {
        self.expr()
    }

    /// Open the one-to-many relationship `name` as a correlated sub-query
    /// filtered to the current row.
    ///
    /// Panics if `name` does not resolve to a back ref; relationship names
    /// are a construction-time contract.
    pub fn children(&self, name: &str) -> Query {
        let r = self
            .ref_at(name)
            .unwrap_or_else(|| panic!("unknown ref {:?} on handle path {:?}", name, self.path));
        let (target, on) = match r {
            Ref::Back { target, on, .. } => (target, on),
            Ref::Forward { .. } => {
                panic!("ref {:?} is a forward ref; use get() to walk it", name)
            }
        };
        let catalog = self.root.catalog().clone();
        let root = self.root.clone();
        let base_path = self.path.clone();
        catalog.query(target).filter(move |child| {
            let mut condition: Option<Expr> = None;
            for (local, foreign) in &on.pairs {
                let mut parent_path = base_path.clone();
                parent_path.push(local.clone());
                let pair = child.get(foreign).expr().eq(Expr::Locator {
                    root: root.clone(),
                    path: parent_path,
                });
                condition = Some(match condition {
                    None => pair,
                    Some(c) => c.and(pair),
                });
            }
            condition.unwrap_or_else(|| Expr::from(true))
        })
    }

    /// Find the ref `name` reachable from this handle's path, walking
    /// forward refs along the way.
    fn ref_at(&self, name: &str) -> Option<Ref> {
        let catalog = self.root.catalog().clone();
        let mut refs: Vec<Ref> = match self.root.kind() {
            SourceKind::Table { catalog, table } => {
                catalog.table_def(*table).schema.refs.clone()
            }
            SourceKind::View { schema, .. } => schema.refs.clone(),
            SourceKind::Query(q) => match &q.projection {
                crate::projection::Projection::Object { refs, .. } => refs.clone(),
                crate::projection::Projection::Scalar { .. } => Vec::new(),
            },
        };
        for segment in &self.path {
            let r = refs.iter().find(|r| r.name() == segment)?;
            match r {
                Ref::Forward { target, .. } => {
                    refs = catalog.table_def(*target).schema.refs.clone();
                }
                Ref::Back { .. } => return None,
            }
        }
        refs.iter().find(|r| r.name() == name).cloned()
    }

    // Comparison sugar so closures can write `h.get("id").eq(1)` without an
    // explicit `.expr()`.

    pub fn eq(&self, rhs: impl Into<Expr>) -> Expr {
        self.expr().eq(rhs)
    }

    pub fn ne(&self, rhs: impl Into<Expr>) -> Expr {
        self.expr().ne(rhs)
    }

    pub fn lt(&self, rhs: impl Into<Expr>) -> Expr {
        self.expr().lt(rhs)
    }

    pub fn le(&self, rhs: impl Into<Expr>) -> Expr {
        self.expr().le(rhs)
    }

    pub fn gt(&self, rhs: impl Into<Expr>) -> Expr {
        self.expr().gt(rhs)
    }

    pub fn ge(&self, rhs: impl Into<Expr>) -> Expr {
        self.expr().ge(rhs)
    }

    pub fn like(&self, pattern: impl Into<Expr>) -> Expr {
        self.expr().like(pattern)
    }
}

impl From<Handle> for Expr {
    fn from(handle: Handle) -> Self {
        handle.expr()
    }
}

impl From<&Handle> for Expr {
    fn from(handle: &Handle) -> Self {
        handle.expr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Catalog, Field, RefCondition, Schema};
    use scalar::{BaseType, ScalarType};

    fn blog_catalog() -> (Catalog, crate::schema::TableId, crate::schema::TableId) {
        let mut builder = Catalog::builder();
        let users = builder.reserve();
        let posts = builder.reserve();
        builder.define(
            users,
            "users",
            Schema::with_refs(
                vec![
                    Field::new("id", ScalarType::new(BaseType::I32)),
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
                    Field::new("id", ScalarType::new(BaseType::I32)),
                    Field::new("title", ScalarType::new(BaseType::Text)),
                    Field::new("author_id", ScalarType::new(BaseType::I32)),
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
    fn test_locator_through_forward_ref_types() {
        let (catalog, _, posts) = blog_catalog();
        let q = catalog.query(posts).map(|h| h.get("author").get("name").expr());
        let ty = q.projection.scalar_type().unwrap();
        assert_eq!(ty.base, BaseType::Text);
        assert!(!ty.nullable);
    }

    #[test]
    fn test_nullable_ref_poisons_path() {
        let mut builder = Catalog::builder();
        let users = builder.reserve();
        let posts = builder.reserve();
        builder.define(
            users,
            "users",
            Schema::new(vec![Field::new("name", ScalarType::new(BaseType::Text))]),
        );
        builder.define(
            posts,
            "posts",
            Schema::with_refs(
                vec![Field::new(
                    "author_id",
                    ScalarType::nullable(BaseType::I32),
                )],
                vec![Ref::Forward {
                    name: "author".to_string(),
                    target: users,
                    on: RefCondition::eq("author_id", "name"),
                    nullable: true,
                }],
            ),
        );
        let catalog = builder.finish().unwrap();
        let q = catalog.query(posts).map(|h| h.get("author").get("name").expr());
        let ty = q.projection.scalar_type().unwrap();
        assert_eq!(ty.base, BaseType::Text);
        assert!(ty.nullable);
    }

    #[test]
    fn test_children_builds_correlated_query() {
        let (catalog, users, _) = blog_catalog();
        let size = catalog
            .query(users)
            .map(|h| h.children("posts").size());
        let ty = size.projection.scalar_type().unwrap();
        assert_eq!(ty.base, BaseType::I64);
        assert!(!ty.nullable);
    }

    #[test]
    #[should_panic(expected = "unknown ref")]
    fn test_children_unknown_ref_panics() {
        let (catalog, users, _) = blog_catalog();
        let _ = catalog.query(users).map(|h| h.children("nope").size());
    }
}
