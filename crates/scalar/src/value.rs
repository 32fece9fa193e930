//! Runtime values and typed literals

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::types::{BaseType, ScalarType};

/// A runtime scalar value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// The most specific type this value inhabits
    pub fn infer_type(&self) -> ScalarType {
        match self {
            Value::Null => ScalarType::nullable(BaseType::Null),
            Value::Bool(_) => ScalarType::new(BaseType::Bool),
            Value::Int(_) => ScalarType::new(BaseType::I64),
            Value::Float(_) => ScalarType::new(BaseType::F64),
            Value::Text(_) => ScalarType::new(BaseType::Text),
            Value::Array(items) => {
                let item = items
                    .first()
                    .map(|v| v.infer_type())
                    .unwrap_or(ScalarType::nullable(BaseType::Null));
                ScalarType::new(BaseType::Array(Box::new(item)))
            }
        }
    }

    /// Total order across all value variants.
    ///
    /// null < bool < numeric < string < array; ints and floats compare
    /// numerically with each other; arrays compare lexicographically. This
    /// order backs ORDER BY, MIN/MAX and the set operations in the
    /// interpreter, so mixed-type columns have a defined ordering instead of
    /// a host-language accident.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Int(_) | Value::Float(_) => 2,
                Value::Text(_) => 3,
                Value::Array(_) => 4,
            }
        }
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.total_cmp(y) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }

    /// Coerce a wire-level value to the declared scalar type.
    ///
    /// Connectors deliver booleans as 0/1 and sometimes numbers as strings;
    /// those two conversions are accepted. Everything else incompatible is a
    /// hard error, as is NULL against a non-nullable type.
    pub fn coerce(&self, ty: &ScalarType) -> Result<Value, CoerceError> {
        let mismatch = || CoerceError::Incompatible {
            value: self.clone(),
            ty: ty.clone(),
        };
        match (self, &ty.base) {
            (Value::Null, _) => {
                if ty.nullable {
                    Ok(Value::Null)
                } else {
                    Err(CoerceError::UnexpectedNull { ty: ty.clone() })
                }
            }
            (Value::Bool(_), BaseType::Bool) => Ok(self.clone()),
            (Value::Int(0), BaseType::Bool) => Ok(Value::Bool(false)),
            (Value::Int(1), BaseType::Bool) => Ok(Value::Bool(true)),
            (Value::Int(_), b) if b.is_integer() => Ok(self.clone()),
            (Value::Int(n), b) if b.is_float() => Ok(Value::Float(*n as f64)),
            (Value::Float(_), b) if b.is_float() => Ok(self.clone()),
            (Value::Float(n), b) if b.is_integer() && n.fract() == 0.0 => {
                Ok(Value::Int(*n as i64))
            }
            (Value::Text(s), b) if b.is_integer() => {
                s.parse::<i64>().map(Value::Int).map_err(|_| mismatch())
            }
            (Value::Text(s), b) if b.is_float() => {
                s.parse::<f64>().map(Value::Float).map_err(|_| mismatch())
            }
            (Value::Text(_), BaseType::Text) => Ok(self.clone()),
            (Value::Array(items), BaseType::Array(item_ty)) => {
                let coerced = items
                    .iter()
                    .map(|v| v.coerce(item_ty))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(coerced))
            }
            _ => Err(mismatch()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "'{}'", s),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A value paired with its declared scalar type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Literal {
    pub value: Value,
    pub ty: ScalarType,
}

impl Literal {
    pub fn null() -> Self {
        Self {
            value: Value::Null,
            ty: ScalarType::nullable(BaseType::Null),
        }
    }

    pub fn bool(b: bool) -> Self {
        Self {
            value: Value::Bool(b),
            ty: ScalarType::new(BaseType::Bool),
        }
    }

    pub fn i32(n: i32) -> Self {
        Self {
            value: Value::Int(n as i64),
            ty: ScalarType::new(BaseType::I32),
        }
    }

    pub fn i64(n: i64) -> Self {
        Self {
            value: Value::Int(n),
            ty: ScalarType::new(BaseType::I64),
        }
    }

    pub fn f64(n: f64) -> Self {
        Self {
            value: Value::Float(n),
            ty: ScalarType::new(BaseType::F64),
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Self {
            value: Value::Text(s.into()),
            ty: ScalarType::new(BaseType::Text),
        }
    }

    /// A homogeneous array literal. All items must share a base type;
    /// mismatches are rejected here, at construction time.
    pub fn array(items: Vec<Literal>) -> Result<Self, LiteralError> {
        let mut item_ty: Option<ScalarType> = None;
        for item in &items {
            match &item_ty {
                None => item_ty = Some(item.ty.clone()),
                Some(ty) => {
                    let merged = ty.merge(&item.ty).map_err(|_| LiteralError::MixedArray {
                        expected: ty.base.clone(),
                        found: item.ty.base.clone(),
                    })?;
                    item_ty = Some(merged);
                }
            }
        }
        let item_ty = item_ty.unwrap_or(ScalarType::nullable(BaseType::Null));
        Ok(Self {
            value: Value::Array(items.into_iter().map(|l| l.value).collect()),
            ty: ScalarType::new(BaseType::Array(Box::new(item_ty))),
        })
    }
}

/// Construction-time literal error
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralError {
    /// Array literal items do not share one scalar type
    MixedArray { expected: BaseType, found: BaseType },
}

impl std::fmt::Display for LiteralError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiteralError::MixedArray { expected, found } => write!(
                f,
                "array literal mixes item types: expected {}, found {}",
                expected, found
            ),
        }
    }
}

impl std::error::Error for LiteralError {}

/// Wire-value coercion error
#[derive(Debug, Clone, PartialEq)]
pub enum CoerceError {
    /// NULL arrived for a non-nullable type
    UnexpectedNull { ty: ScalarType },
    /// The wire value cannot represent the declared type
    Incompatible { value: Value, ty: ScalarType },
}

impl std::fmt::Display for CoerceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoerceError::UnexpectedNull { ty } => {
                write!(f, "unexpected NULL for non-nullable type {}", ty)
            }
            CoerceError::Incompatible { value, ty } => {
                write!(f, "value {} is incompatible with type {}", value, ty)
            }
        }
    }
}

impl std::error::Error for CoerceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order_across_types() {
        let mut values = vec![
            Value::Text("a".to_string()),
            Value::Int(3),
            Value::Null,
            Value::Float(2.5),
            Value::Bool(true),
        ];
        values.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Float(2.5),
                Value::Int(3),
                Value::Text("a".to_string()),
            ]
        );
    }

    #[test]
    fn test_int_float_compare_numerically() {
        assert_eq!(Value::Int(2).total_cmp(&Value::Float(2.0)), Ordering::Equal);
        assert_eq!(Value::Int(2).total_cmp(&Value::Float(2.5)), Ordering::Less);
    }

    #[test]
    fn test_array_literal_homogeneous() {
        let lit = Literal::array(vec![Literal::i64(1), Literal::i64(2)]).unwrap();
        assert_eq!(
            lit.value,
            Value::Array(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_array_literal_mixed_rejected() {
        let err = Literal::array(vec![Literal::i64(1), Literal::text("x")]);
        assert!(err.is_err());
    }

    #[test]
    fn test_coerce_wire_bool() {
        let ty = ScalarType::new(BaseType::Bool);
        assert_eq!(Value::Int(1).coerce(&ty), Ok(Value::Bool(true)));
        assert_eq!(Value::Int(0).coerce(&ty), Ok(Value::Bool(false)));
        assert!(Value::Int(2).coerce(&ty).is_err());
    }

    #[test]
    fn test_coerce_rejects_unexpected_null() {
        let ty = ScalarType::new(BaseType::I64);
        assert_eq!(
            Value::Null.coerce(&ty),
            Err(CoerceError::UnexpectedNull { ty })
        );
    }

    #[test]
    fn test_coerce_numeric_string() {
        let ty = ScalarType::new(BaseType::F64);
        assert_eq!(
            Value::Text("2.5".to_string()).coerce(&ty),
            Ok(Value::Float(2.5))
        );
    }
}
