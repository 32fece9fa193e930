//! Projections: the static description of what a query or expression node
//! yields, either one typed scalar or a named set of scalar leaves plus
//! relationship edges.

use scalar::{ScalarType, TypeError};

use crate::expr::Expr;
use crate::names;
use crate::schema::{Catalog, Ref};

/// One scalar leaf of an object projection
#[derive(Debug, Clone)]
pub struct Prop {
    /// Nested output path, e.g. `["author", "name"]`
    pub path: Vec<String>,
    pub expr: Expr,
}

impl Prop {
    pub fn new(path: Vec<String>, expr: Expr) -> Self {
        Self { path, expr }
    }

    /// Flat column alias for this prop
    pub fn alias(&self) -> String {
        names::column_alias(&self.path)
    }
}

/// What one query/expression node yields
#[derive(Debug, Clone)]
pub enum Projection {
    /// A single typed scalar
    Scalar { expr: Expr },
    /// A keyed set of scalar leaves plus relationship edges
    Object {
        props: Vec<Prop>,
        refs: Vec<Ref>,
        nullable: bool,
        catalog: Catalog,
    },
}

/// Result of resolving a path against an object projection
pub enum Lookup<'a> {
    Prop(&'a Prop),
    Ref { r: &'a Ref, rest: &'a [String] },
    NotFound,
}

impl Projection {
    pub fn is_scalar(&self) -> bool {
        matches!(self, Projection::Scalar { .. })
    }

    /// The type of a scalar projection; object projections have no single
    /// scalar type.
    pub fn scalar_type(&self) -> Result<ScalarType, TypeError> {
        match self {
            Projection::Scalar { expr } => expr.scalar_type(),
            Projection::Object { .. } => Err(TypeError::ScalarQueryRequired),
        }
    }

    /// Resolve a path: an exact prop match wins, otherwise the first segment
    /// may name a relationship edge.
    pub fn lookup<'a>(&'a self, path: &'a [String]) -> Lookup<'a> {
        match self {
            Projection::Scalar { .. } => Lookup::NotFound,
            Projection::Object { props, refs, .. } => {
                if let Some(prop) = props.iter().find(|p| p.path == path) {
                    return Lookup::Prop(prop);
                }
                if let Some(first) = path.first() {
                    if let Some(r) = refs.iter().find(|r| r.name() == first) {
                        return Lookup::Ref { r, rest: &path[1..] };
                    }
                }
                Lookup::NotFound
            }
        }
    }

    /// Merge later props over earlier ones: overlapping paths from later
    /// sources win, mirroring shallow object merge.
    pub fn merge_props(base: Vec<Prop>, overlay: Vec<Prop>) -> Vec<Prop> {
        let mut merged: Vec<Prop> = base
            .into_iter()
            .filter(|p| !overlay.iter().any(|o| o.path == p.path))
            .collect();
        merged.extend(overlay);
        merged
    }

    /// Resolve the fully-typed flat row shape this projection produces.
    pub fn shape(&self) -> Result<RowShape, TypeError> {
        match self {
            Projection::Scalar { expr } => Ok(RowShape {
                kind: ShapeKind::Scalar(expr.scalar_type()?),
            }),
            Projection::Object { props, nullable, .. } => {
                let mut columns = Vec::with_capacity(props.len());
                for prop in props {
                    let ty = prop.expr.scalar_type()?.with_nullable(*nullable);
                    columns.push((prop.path.clone(), ty));
                }
                Ok(RowShape {
                    kind: ShapeKind::Object(columns),
                })
            }
        }
    }
}

/// Resolved, typed row shape handed across the connector boundary so
/// `materialize` can rebuild nested values without re-running inference.
#[derive(Debug, Clone, PartialEq)]
pub struct RowShape {
    pub kind: ShapeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShapeKind {
    Scalar(ScalarType),
    Object(Vec<(Vec<String>, ScalarType)>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use scalar::Literal;

    fn prop(path: &[&str], n: i64) -> Prop {
        Prop::new(
            path.iter().map(|s| s.to_string()).collect(),
            Expr::from(Literal::i64(n)),
        )
    }

    #[test]
    fn test_merge_props_last_wins() {
        let base = vec![prop(&["id"], 1), prop(&["title"], 2)];
        let overlay = vec![prop(&["title"], 3)];
        let merged = Projection::merge_props(base, overlay);
        assert_eq!(merged.len(), 2);
        let title = merged.iter().find(|p| p.path == ["title"]).unwrap();
        match &title.expr {
            Expr::Literal(lit) => assert_eq!(lit, &Literal::i64(3)),
            other => panic!("unexpected expr: {:?}", other),
        }
    }
}
