use scalar::{CoerceError, TypeError, Value};

/// Interpreter failure. Unsupported operations are hard errors rather than
/// approximations, so the interpreter stays trustworthy as ground truth.
#[derive(Debug, Clone, PartialEq)]
pub enum InterpError {
    Type(TypeError),
    Coerce(CoerceError),
    /// Inserted row names a field the table schema does not have
    UnknownField { table: String, field: String },
    /// Inserted row omits a non-nullable field
    MissingField { table: String, field: String },
    /// Group-by is compile-only; the interpreter refuses it
    GroupByUnsupported,
    /// Raw SQL views and expressions cannot be evaluated in memory
    RawSqlUnsupported,
    /// Aggregation functions only appear inside group-by projections
    AggregateUnsupported { func: &'static str },
    /// A locator's root source has no row bound in the current scope
    UnboundSource,
    /// Combined queries expose different column sets
    ShapeMismatch { left: Vec<String>, right: Vec<String> },
    /// A numeric aggregate met a non-numeric, non-null value
    NonNumericAggregate { found: Value },
}

impl std::fmt::Display for InterpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterpError::Type(e) => write!(f, "type error: {}", e),
            InterpError::Coerce(e) => write!(f, "coercion error: {}", e),
            InterpError::UnknownField { table, field } => {
                write!(f, "table {} has no field {}", table, field)
            }
            InterpError::MissingField { table, field } => {
                write!(f, "row for table {} omits non-nullable field {}", table, field)
            }
            InterpError::GroupByUnsupported => {
                write!(f, "the interpreter does not execute group-by")
            }
            InterpError::RawSqlUnsupported => {
                write!(f, "the interpreter does not execute raw SQL")
            }
            InterpError::AggregateUnsupported { func } => {
                write!(f, "aggregate {} outside a group-by projection", func)
            }
            InterpError::UnboundSource => {
                write!(f, "locator references a source with no bound row")
            }
            InterpError::ShapeMismatch { left, right } => write!(
                f,
                "combined queries differ in shape: {:?} vs {:?}",
                left, right
            ),
            InterpError::NonNumericAggregate { found } => {
                write!(f, "numeric aggregate over non-numeric value {}", found)
            }
        }
    }
}

impl std::error::Error for InterpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InterpError::Type(e) => Some(e),
            InterpError::Coerce(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TypeError> for InterpError {
    fn from(e: TypeError) -> Self {
        InterpError::Type(e)
    }
}

impl From<CoerceError> for InterpError {
    fn from(e: CoerceError) -> Self {
        InterpError::Coerce(e)
    }
}
