//! Scalar types with nullability

use serde::{Deserialize, Serialize};

/// The base (non-null-aware) scalar type tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaseType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Text,
    /// The type of a bare NULL literal, before any context assigns it a type
    Null,
    /// Homogeneous array of scalars
    Array(Box<ScalarType>),
}

impl BaseType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            BaseType::I8
                | BaseType::I16
                | BaseType::I32
                | BaseType::I64
                | BaseType::F32
                | BaseType::F64
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            BaseType::I8 | BaseType::I16 | BaseType::I32 | BaseType::I64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, BaseType::F32 | BaseType::F64)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, BaseType::Text)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, BaseType::Bool)
    }
}

impl std::fmt::Display for BaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BaseType::Bool => write!(f, "boolean"),
            BaseType::I8 => write!(f, "i8"),
            BaseType::I16 => write!(f, "i16"),
            BaseType::I32 => write!(f, "i32"),
            BaseType::I64 => write!(f, "i64"),
            BaseType::F32 => write!(f, "f32"),
            BaseType::F64 => write!(f, "f64"),
            BaseType::Text => write!(f, "string"),
            BaseType::Null => write!(f, "null"),
            BaseType::Array(item) => write!(f, "array<{}>", item),
        }
    }
}

/// A scalar type together with whether values of it may be NULL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarType {
    pub base: BaseType,
    pub nullable: bool,
}

impl ScalarType {
    /// A non-nullable type with the given base
    pub fn new(base: BaseType) -> Self {
        Self {
            base,
            nullable: false,
        }
    }

    /// A nullable type with the given base
    pub fn nullable(base: BaseType) -> Self {
        Self {
            base,
            nullable: true,
        }
    }

    /// The same base type with nullability forced on
    pub fn as_nullable(&self) -> Self {
        Self {
            base: self.base.clone(),
            nullable: true,
        }
    }

    /// The same base type, nullable if either `self` already is or `extra`
    /// asks for it
    pub fn with_nullable(&self, extra: bool) -> Self {
        Self {
            base: self.base.clone(),
            nullable: self.nullable || extra,
        }
    }

    /// Merge two branch types (CASE arms, COALESCE arguments).
    ///
    /// A `null`-typed branch contributes only nullability; otherwise the
    /// bases must agree.
    pub fn merge(&self, other: &ScalarType) -> Result<ScalarType, TypeError> {
        let nullable = self.nullable || other.nullable;
        let base = match (&self.base, &other.base) {
            (BaseType::Null, b) => b.clone(),
            (b, BaseType::Null) => b.clone(),
            (a, b) if a == b => a.clone(),
            // Numeric branches widen to f64
            (a, b) if a.is_numeric() && b.is_numeric() => BaseType::F64,
            (a, b) => {
                return Err(TypeError::BranchMismatch {
                    left: a.clone(),
                    right: b.clone(),
                })
            }
        };
        // A bare NULL branch means the merged type can produce NULL
        let nullable =
            nullable || self.base == BaseType::Null || other.base == BaseType::Null;
        Ok(ScalarType { base, nullable })
    }
}

impl std::fmt::Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.nullable {
            write!(f, "{}?", self.base)
        } else {
            write!(f, "{}", self.base)
        }
    }
}

/// Static typing error raised while inferring expression types
#[derive(Debug, Clone, PartialEq)]
pub enum TypeError {
    /// Operand of a numeric operator is not numeric
    NotNumeric { op: String, found: BaseType },
    /// Operand of a string operator is not a string
    NotText { op: String, found: BaseType },
    /// Operand of a boolean operator is not boolean
    NotBool { op: String, found: BaseType },
    /// Operand of a bit operator is not an integer
    NotInteger { op: String, found: BaseType },
    /// CASE/COALESCE branches have incompatible types
    BranchMismatch { left: BaseType, right: BaseType },
    /// Right-hand side of IN is not an array of the left-hand type
    InOperandMismatch { left: BaseType, right: BaseType },
    /// A function call carries fewer arguments than it requires
    FuncArity {
        func: String,
        expected: usize,
        found: usize,
    },
    /// A locator path step names an unknown field or ref
    UnknownProp { name: String },
    /// A locator path walks a one-to-many ref, which yields a query, not a
    /// scalar
    BackRefInExpr { name: String },
    /// A scalar-projected query was required
    ScalarQueryRequired,
    /// An object projection was required
    ObjectQueryRequired,
}

impl std::fmt::Display for TypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeError::NotNumeric { op, found } => {
                write!(f, "operator {} requires numeric operands, got {}", op, found)
            }
            TypeError::NotText { op, found } => {
                write!(f, "operator {} requires string operands, got {}", op, found)
            }
            TypeError::NotBool { op, found } => {
                write!(f, "operator {} requires boolean operands, got {}", op, found)
            }
            TypeError::NotInteger { op, found } => {
                write!(f, "operator {} requires integer operands, got {}", op, found)
            }
            TypeError::BranchMismatch { left, right } => {
                write!(f, "branch types {} and {} are incompatible", left, right)
            }
            TypeError::InOperandMismatch { left, right } => {
                write!(f, "IN requires array<{}> on the right, got {}", left, right)
            }
            TypeError::FuncArity {
                func,
                expected,
                found,
            } => {
                write!(
                    f,
                    "function {} requires {} argument(s), got {}",
                    func, expected, found
                )
            }
            TypeError::UnknownProp { name } => write!(f, "unknown field or ref: {}", name),
            TypeError::BackRefInExpr { name } => {
                write!(f, "one-to-many ref {} cannot be used as a scalar", name)
            }
            TypeError::ScalarQueryRequired => write!(f, "a scalar-projected query is required"),
            TypeError::ObjectQueryRequired => write!(f, "an object-projected query is required"),
        }
    }
}

impl std::error::Error for TypeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_null_branch() {
        let int = ScalarType::new(BaseType::I64);
        let null = ScalarType::nullable(BaseType::Null);
        let merged = int.merge(&null).unwrap();
        assert_eq!(merged.base, BaseType::I64);
        assert!(merged.nullable);
    }

    #[test]
    fn test_merge_numeric_widens() {
        let int = ScalarType::new(BaseType::I32);
        let float = ScalarType::new(BaseType::F64);
        let merged = int.merge(&float).unwrap();
        assert_eq!(merged.base, BaseType::F64);
        assert!(!merged.nullable);
    }

    #[test]
    fn test_merge_incompatible() {
        let int = ScalarType::new(BaseType::I32);
        let text = ScalarType::new(BaseType::Text);
        assert!(int.merge(&text).is_err());
    }
}
