use scalar::TypeError;

/// Compilation failure
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    Type(TypeError),
    /// An aggregation function appeared where no GROUP BY provides a group
    AggregateNotAllowed { func: &'static str },
    /// Relationship joins whose root alias belongs to no compiled SELECT,
    /// usually a handle used outside the query it was created for. Carries
    /// the SQL built so far so the leaking locator can be traced.
    OrphanedJoins {
        aliases: Vec<String>,
        partial_sql: String,
    },
    /// Combined queries project different column sets
    CombineShapeMismatch {
        left: Vec<String>,
        right: Vec<String>,
    },
}

impl From<TypeError> for CompileError {
    fn from(err: TypeError) -> Self {
        CompileError::Type(err)
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Type(err) => write!(f, "{}", err),
            CompileError::AggregateNotAllowed { func } => {
                write!(f, "aggregate function {} used outside a group-by", func)
            }
            CompileError::OrphanedJoins {
                aliases,
                partial_sql,
            } => write!(
                f,
                "relationship joins [{}] have no owning select; was a handle \
                 used outside its own query? compiled so far: {}",
                aliases.join(", "),
                partial_sql
            ),
            CompileError::CombineShapeMismatch { left, right } => write!(
                f,
                "combined queries project different columns: [{}] vs [{}]",
                left.join(", "),
                right.join(", ")
            ),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Type(err) => Some(err),
            _ => None,
        }
    }
}
