//! Query algebra and fluent builder
//!
//! A `Query` is an immutable operator tree over a `QuerySource`. Builder
//! methods never mutate; each wraps the receiver as the source of a new
//! node. Sources carry an identity so the compiler can allocate one alias
//! per source no matter how often it is referenced.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::expr::{Expr, SqlTemplate, TerminatorKind};
use crate::handle::Handle;
use crate::projection::{Projection, Prop};
use crate::schema::{Catalog, Schema, TableId};

/// Identity of a query source. Allocated once per source; clones share it,
/// so alias allocation is keyed by identity rather than structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

impl SourceId {
    fn next() -> Self {
        SourceId(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// What a source wraps
#[derive(Debug, Clone)]
pub enum SourceKind {
    /// A named catalog table
    Table { catalog: Catalog, table: TableId },
    /// A raw-SQL view with a declared schema
    View {
        catalog: Catalog,
        template: SqlTemplate,
        schema: Schema,
    },
    /// A nested query
    Query(Box<Query>),
}

#[derive(Debug)]
struct SourceInner {
    id: SourceId,
    kind: SourceKind,
}

/// A shareable query source. Cloning preserves identity.
#[derive(Debug, Clone)]
pub struct QuerySource(Arc<SourceInner>);

impl QuerySource {
    fn new(kind: SourceKind) -> Self {
        QuerySource(Arc::new(SourceInner {
            id: SourceId::next(),
            kind,
        }))
    }

    pub fn id(&self) -> SourceId {
        self.0.id
    }

    pub fn kind(&self) -> &SourceKind {
        &self.0.kind
    }

    pub fn catalog(&self) -> &Catalog {
        match &self.0.kind {
            SourceKind::Table { catalog, .. } => catalog,
            SourceKind::View { catalog, .. } => catalog,
            SourceKind::Query(q) => q.catalog(),
        }
    }

    /// Projection of this source as seen by consumers: one locator per
    /// scalar leaf, rooted at this source.
    pub fn projection(&self) -> Projection {
        match &self.0.kind {
            SourceKind::Table { catalog, table } => {
                let schema = &catalog.table_def(*table).schema;
                projection_from_schema(catalog, schema, self)
            }
            SourceKind::View {
                catalog, schema, ..
            } => projection_from_schema(catalog, schema, self),
            SourceKind::Query(q) => match &q.projection {
                Projection::Scalar { .. } => Projection::Scalar {
                    expr: Expr::Locator {
                        root: self.clone(),
                        path: Vec::new(),
                    },
                },
                Projection::Object {
                    props,
                    refs,
                    nullable,
                    catalog,
                } => Projection::Object {
                    props: props
                        .iter()
                        .map(|p| {
                            Prop::new(
                                p.path.clone(),
                                Expr::Locator {
                                    root: self.clone(),
                                    path: p.path.clone(),
                                },
                            )
                        })
                        .collect(),
                    refs: refs.clone(),
                    nullable: *nullable,
                    catalog: catalog.clone(),
                },
            },
        }
    }
}

fn projection_from_schema(catalog: &Catalog, schema: &Schema, source: &QuerySource) -> Projection {
    Projection::Object {
        props: schema
            .fields
            .iter()
            .map(|f| {
                Prop::new(
                    vec![f.name.clone()],
                    Expr::Locator {
                        root: source.clone(),
                        path: vec![f.name.clone()],
                    },
                )
            })
            .collect(),
        refs: schema.refs.clone(),
        nullable: false,
        catalog: catalog.clone(),
    }
}

/// Join flavors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

/// Combination flavors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineKind {
    Union,
    UnionAll,
    Intersect,
    Except,
    /// Order-preserving append, unlike UNION ALL
    Concat,
}

/// NULL placement in an ordering term. `Default` is NULLs-first ascending
/// and NULLs-last descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    Default,
    First,
    Last,
}

/// One ORDER BY term
#[derive(Debug, Clone)]
pub struct OrderTerm {
    pub expr: Expr,
    pub desc: bool,
    pub nulls: NullsOrder,
}

impl OrderTerm {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            desc: false,
            nulls: NullsOrder::Default,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            desc: true,
            nulls: NullsOrder::Default,
        }
    }

    pub fn with_nulls(mut self, nulls: NullsOrder) -> Self {
        self.nulls = nulls;
        self
    }
}

/// The operator applied on top of `source`
#[derive(Debug, Clone)]
pub enum QueryOp {
    /// Pass-through over the source
    Proxy,
    Filter {
        predicate: Expr,
    },
    /// Reshape; the new shape is the query's `projection`
    Map,
    OrderBy {
        terms: Vec<OrderTerm>,
    },
    GroupBy {
        by: Vec<Expr>,
        having: Option<Expr>,
    },
    Join {
        kind: JoinKind,
        right: QuerySource,
        on: Option<Expr>,
        /// Lateral joins may reference left-side columns per row; used to
        /// implement flat-map
        lateral: bool,
    },
    Combine {
        kind: CombineKind,
        other: Box<Query>,
    },
    Unique,
    Paginate {
        limit: Option<u64>,
        offset: Option<u64>,
    },
}

/// One node of the query operator tree
#[derive(Debug, Clone)]
pub struct Query {
    pub source: QuerySource,
    pub projection: Projection,
    pub op: QueryOp,
}

impl Catalog {
    /// The proxy query over a catalog table.
    pub fn query(&self, id: TableId) -> Query {
        let source = QuerySource::new(SourceKind::Table {
            catalog: self.clone(),
            table: id,
        });
        let projection = source.projection();
        Query {
            source,
            projection,
            op: QueryOp::Proxy,
        }
    }

    /// A query over a raw-SQL view with a declared schema. The compiler
    /// inlines the SQL; the interpreter rejects it.
    pub fn view(&self, template: SqlTemplate, schema: Schema) -> Query {
        let source = QuerySource::new(SourceKind::View {
            catalog: self.clone(),
            template,
            schema,
        });
        let projection = source.projection();
        Query {
            source,
            projection,
            op: QueryOp::Proxy,
        }
    }
}

impl Query {
    pub fn catalog(&self) -> &Catalog {
        self.source.catalog()
    }

    /// Wrap this query as the source of the next operator.
    fn wrap(self) -> (QuerySource, Projection) {
        let source = QuerySource::new(SourceKind::Query(Box::new(self)));
        let projection = source.projection();
        (source, projection)
    }

    pub fn filter(self, f: impl FnOnce(&Handle) -> Expr) -> Query {
        let (source, projection) = self.wrap();
        let handle = Handle::root(source.clone());
        let predicate = f(&handle);
        Query {
            source,
            projection,
            op: QueryOp::Filter { predicate },
        }
    }

    /// Project each row to a single scalar.
    pub fn map(self, f: impl FnOnce(&Handle) -> Expr) -> Query {
        let (source, _) = self.wrap();
        let handle = Handle::root(source.clone());
        let expr = f(&handle);
        Query {
            source,
            projection: Projection::Scalar { expr },
            op: QueryOp::Map,
        }
    }

    /// Project each row to a named set of scalars. Dotted names produce
    /// nested output paths; a repeated path overwrites the earlier entry.
    pub fn map_object(self, f: impl FnOnce(&Handle) -> Vec<(&'static str, Expr)>) -> Query {
        let (source, _) = self.wrap();
        let handle = Handle::root(source.clone());
        let catalog = source.catalog().clone();
        let mut props: Vec<Prop> = Vec::new();
        for (name, expr) in f(&handle) {
            let path: Vec<String> = name.split('.').map(|s| s.to_string()).collect();
            props.retain(|p| p.path != path);
            props.push(Prop::new(path, expr));
        }
        Query {
            source,
            projection: Projection::Object {
                props,
                refs: Vec::new(),
                nullable: false,
                catalog,
            },
            op: QueryOp::Map,
        }
    }

    pub fn order_by(self, f: impl FnOnce(&Handle) -> Vec<OrderTerm>) -> Query {
        let (source, projection) = self.wrap();
        let handle = Handle::root(source.clone());
        let terms = f(&handle);
        Query {
            source,
            projection,
            op: QueryOp::OrderBy { terms },
        }
    }

    pub fn order_by_asc(self, f: impl FnOnce(&Handle) -> Expr) -> Query {
        self.order_by(|h| vec![OrderTerm::asc(f(h))])
    }

    pub fn order_by_desc(self, f: impl FnOnce(&Handle) -> Expr) -> Query {
        self.order_by(|h| vec![OrderTerm::desc(f(h))])
    }

    /// Group rows by the `by` expressions and aggregate into the given
    /// object projection. The reference interpreter refuses group-by; the
    /// compiler lowers it to GROUP BY.
    pub fn group_by(
        self,
        by: impl FnOnce(&Handle) -> Vec<Expr>,
        projection: impl FnOnce(&Handle) -> Vec<(&'static str, Expr)>,
    ) -> Query {
        self.group_by_inner(by, projection, None::<fn(&Handle) -> Expr>)
    }

    pub fn group_by_having(
        self,
        by: impl FnOnce(&Handle) -> Vec<Expr>,
        projection: impl FnOnce(&Handle) -> Vec<(&'static str, Expr)>,
        having: impl FnOnce(&Handle) -> Expr,
    ) -> Query {
        self.group_by_inner(by, projection, Some(having))
    }

    fn group_by_inner(
        self,
        by: impl FnOnce(&Handle) -> Vec<Expr>,
        projection: impl FnOnce(&Handle) -> Vec<(&'static str, Expr)>,
        having: Option<impl FnOnce(&Handle) -> Expr>,
    ) -> Query {
        let (source, _) = self.wrap();
        let handle = Handle::root(source.clone());
        let catalog = source.catalog().clone();
        let by = by(&handle);
        let mut props: Vec<Prop> = Vec::new();
        for (name, expr) in projection(&handle) {
            let path: Vec<String> = name.split('.').map(|s| s.to_string()).collect();
            props.retain(|p| p.path != path);
            props.push(Prop::new(path, expr));
        }
        let having = having.map(|f| f(&handle));
        Query {
            source,
            projection: Projection::Object {
                props,
                refs: Vec::new(),
                nullable: false,
                catalog,
            },
            op: QueryOp::GroupBy { by, having },
        }
    }

    /// General join. The projection closure sees handles for both sides;
    /// later entries overwrite earlier ones on path collisions.
    pub fn join_on(
        self,
        kind: JoinKind,
        right: Query,
        on: impl FnOnce(&Handle, &Handle) -> Expr,
        projection: impl FnOnce(&Handle, &Handle) -> Vec<(&'static str, Expr)>,
    ) -> Query {
        let (source, _) = self.wrap();
        let right_source = QuerySource::new(SourceKind::Query(Box::new(right)));
        let left_handle = Handle::root(source.clone());
        let right_handle = Handle::root(right_source.clone());
        let catalog = source.catalog().clone();
        let on_expr = on(&left_handle, &right_handle);
        let mut props: Vec<Prop> = Vec::new();
        for (name, expr) in projection(&left_handle, &right_handle) {
            let path: Vec<String> = name.split('.').map(|s| s.to_string()).collect();
            props.retain(|p| p.path != path);
            props.push(Prop::new(path, expr));
        }
        Query {
            source,
            projection: Projection::Object {
                props,
                refs: Vec::new(),
                nullable: false,
                catalog,
            },
            op: QueryOp::Join {
                kind,
                right: right_source,
                on: Some(on_expr),
                lateral: false,
            },
        }
    }

    /// Lateral flat-map: for each left row, the closure builds a correlated
    /// sub-query; the result is the concatenation of all sub-query rows.
    pub fn flat_map(self, f: impl FnOnce(&Handle) -> Query) -> Query {
        let (source, _) = self.wrap();
        let left_handle = Handle::root(source.clone());
        let right = f(&left_handle);
        let right_source = QuerySource::new(SourceKind::Query(Box::new(right)));
        let projection = right_source.projection();
        Query {
            source,
            projection,
            op: QueryOp::Join {
                kind: JoinKind::Inner,
                right: right_source,
                on: None,
                lateral: true,
            },
        }
    }

    pub fn combine(self, kind: CombineKind, other: Query) -> Query {
        let (source, projection) = self.wrap();
        Query {
            source,
            projection,
            op: QueryOp::Combine {
                kind,
                other: Box::new(other),
            },
        }
    }

    pub fn union(self, other: Query) -> Query {
        self.combine(CombineKind::Union, other)
    }

    pub fn union_all(self, other: Query) -> Query {
        self.combine(CombineKind::UnionAll, other)
    }

    pub fn intersect(self, other: Query) -> Query {
        self.combine(CombineKind::Intersect, other)
    }

    pub fn except(self, other: Query) -> Query {
        self.combine(CombineKind::Except, other)
    }

    /// Order-preserving concatenation of two queries.
    pub fn concat(self, other: Query) -> Query {
        self.combine(CombineKind::Concat, other)
    }

    pub fn unique(self) -> Query {
        let (source, projection) = self.wrap();
        Query {
            source,
            projection,
            op: QueryOp::Unique,
        }
    }

    pub fn paginate(self, limit: Option<u64>, offset: Option<u64>) -> Query {
        let (source, projection) = self.wrap();
        Query {
            source,
            projection,
            op: QueryOp::Paginate { limit, offset },
        }
    }

    pub fn limit(self, limit: u64) -> Query {
        self.paginate(Some(limit), None)
    }

    pub fn limit_offset(self, limit: u64, offset: u64) -> Query {
        self.paginate(Some(limit), Some(offset))
    }

    pub fn skip(self, offset: u64) -> Query {
        self.paginate(None, Some(offset))
    }

    // -- terminators: collapse the query into one scalar expression --

    fn terminate(self, kind: TerminatorKind) -> Expr {
        Expr::Terminator {
            kind,
            query: Box::new(self),
        }
    }

    /// Row count.
    pub fn size(self) -> Expr {
        self.terminate(TerminatorKind::Size)
    }

    /// True if at least one row exists.
    pub fn some(self) -> Expr {
        self.terminate(TerminatorKind::Some)
    }

    /// True if no row exists.
    pub fn empty(self) -> Expr {
        self.terminate(TerminatorKind::Empty)
    }

    /// First row of the scalar projection, NULL when empty.
    pub fn first(self) -> Expr {
        self.terminate(TerminatorKind::First)
    }

    pub fn max(self) -> Expr {
        self.terminate(TerminatorKind::Max)
    }

    pub fn min(self) -> Expr {
        self.terminate(TerminatorKind::Min)
    }

    pub fn sum(self) -> Expr {
        self.terminate(TerminatorKind::Sum)
    }

    /// Arithmetic mean over non-null rows, defined as sum/count.
    pub fn mean(self) -> Expr {
        self.terminate(TerminatorKind::Mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, Schema};
    use scalar::{BaseType, ScalarType};

    fn posts_catalog() -> (Catalog, TableId) {
        let mut builder = Catalog::builder();
        let posts = builder.table(
            "posts",
            Schema::new(vec![
                Field::new("id", ScalarType::new(BaseType::I32)),
                Field::new("title", ScalarType::new(BaseType::Text)),
            ]),
        );
        (builder.finish().unwrap(), posts)
    }

    #[test]
    fn test_source_identity_stable_across_clones() {
        let (catalog, posts) = posts_catalog();
        let q = catalog.query(posts);
        let cloned = q.source.clone();
        assert_eq!(q.source.id(), cloned.id());
        let other = catalog.query(posts);
        assert_ne!(q.source.id(), other.source.id());
    }

    #[test]
    fn test_builder_is_pure() {
        let (catalog, posts) = posts_catalog();
        let base = catalog.query(posts);
        let filtered = base.clone().filter(|h| h.get("id").expr().eq(1i64));
        // The original keeps its op; the new node wraps it
        assert!(matches!(base.op, QueryOp::Proxy));
        assert!(matches!(filtered.op, QueryOp::Filter { .. }));
    }

    #[test]
    fn test_map_scalar_projection_type() {
        let (catalog, posts) = posts_catalog();
        let q = catalog.query(posts).map(|h| h.get("title").expr());
        let ty = q.projection.scalar_type().unwrap();
        assert_eq!(ty.base, BaseType::Text);
        assert!(!ty.nullable);
    }

    #[test]
    fn test_map_object_last_wins() {
        let (catalog, posts) = posts_catalog();
        let q = catalog.query(posts).map_object(|h| {
            vec![
                ("x", h.get("id").expr()),
                ("x", h.get("title").expr()),
            ]
        });
        match &q.projection {
            Projection::Object { props, .. } => {
                assert_eq!(props.len(), 1);
                let ty = props[0].expr.scalar_type().unwrap();
                assert_eq!(ty.base, BaseType::Text);
            }
            other => panic!("unexpected projection: {:?}", other),
        }
    }
}
