//! Dynamic values exchanged with the engine
//!
//! Host data enters and leaves the engine as [`Value`] trees. Composite
//! values are [`ObjectValue`]s tagged with their concrete type name.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::schema::types::ElementType;

/// A value that can be serialized
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    /// Absent value
    #[default]
    Null,
    Bool(bool),
    /// Signed integer value
    Int(i64),
    /// Unsigned integer value
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// Ordered key/value entries
    Map(Vec<(Value, Value)>),
    Object(ObjectValue),
}

impl Value {
    /// Try to get as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::UInt(u) => i64::try_from(*u).ok(),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Try to get as u64
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::Int(i) => u64::try_from(*i).ok(),
            Value::UInt(u) => Some(*u),
            Value::Float(f) if f.fract() == 0.0 && *f >= 0.0 => Some(*f as u64),
            Value::Bool(b) => Some(*b as u64),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(*b as u8 as f64),
            _ => None,
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::UInt(u) => Some(*u != 0),
            Value::Float(f) => Some(*f != 0.0),
            _ => None,
        }
    }

    /// Try to get as bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Try to get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as object
    pub fn as_object(&self) -> Option<&ObjectValue> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Try to get as list
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Interpret as a byte count, length or offset
    pub fn as_usize(&self) -> Result<usize> {
        self.as_uint()
            .and_then(|u| usize::try_from(u).ok())
            .ok_or_else(|| Error::ValueOutOfRange {
                value: format!("{:?}", self),
                target: "usize",
            })
    }

    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integral view used by the coercing comparisons
    fn as_integral(&self) -> Option<i128> {
        match self {
            Value::Int(i) => Some(i128::from(*i)),
            Value::UInt(u) => Some(i128::from(*u)),
            Value::Bool(b) => Some(i128::from(*b)),
            _ => None,
        }
    }

    /// Equality after type coercion
    ///
    /// Integers, floats and booleans compare by numeric value, so `UInt(1)`,
    /// `Int(1)`, `Float(1.0)` and `Bool(true)` are all equal.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        if let (Some(a), Some(b)) = (self.as_integral(), other.as_integral()) {
            return a == b;
        }
        match (self, other) {
            (Value::Float(_), _) | (_, Value::Float(_)) => {
                match (self.as_float(), other.as_float()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_equals(y))
            }
            (Value::String(a), Value::Bytes(b)) | (Value::Bytes(b), Value::String(a)) => {
                a.as_bytes() == b.as_slice()
            }
            _ => self == other,
        }
    }

    /// Ordering after type coercion, if the values are comparable
    pub fn loose_cmp(&self, other: &Value) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.as_integral(), other.as_integral()) {
            return Some(a.cmp(&b));
        }
        match (self, other) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            _ => match (self.as_float(), other.as_float()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }

    /// Normalize this value to the representation of an element type
    ///
    /// Numbers are range-checked, `Null` becomes the element's default for
    /// strings, bytes and collections.
    pub fn coerce_to(&self, element: &ElementType) -> Result<Value> {
        let out_of_range = |target: &'static str| Error::ValueOutOfRange {
            value: format!("{:?}", self),
            target,
        };

        if let Some((min, max)) = element.integer_bounds() {
            let target = integer_name(element);
            let n = match self {
                Value::Float(f) if f.fract() == 0.0 => Some(*f as i128),
                Value::Null => Some(0),
                other => other.as_integral(),
            }
            .ok_or_else(|| out_of_range(target))?;
            if n < min || n > max {
                return Err(out_of_range(target));
            }
            return Ok(if min < 0 {
                Value::Int(n as i64)
            } else {
                Value::UInt(n as u64)
            });
        }

        match element {
            ElementType::Bool => match self {
                Value::Null => Ok(Value::Bool(false)),
                other => other.as_bool().map(Value::Bool).ok_or_else(|| out_of_range("bool")),
            },
            ElementType::F32 | ElementType::F64 => match self {
                Value::Null => Ok(Value::Float(0.0)),
                other => other.as_float().map(Value::Float).ok_or_else(|| out_of_range("float")),
            },
            ElementType::String => match self {
                Value::Null => Ok(Value::String(String::new())),
                Value::String(s) => Ok(Value::String(s.clone())),
                _ => Err(out_of_range("string")),
            },
            ElementType::Bytes => match self {
                Value::Null => Ok(Value::Bytes(Vec::new())),
                Value::Bytes(b) => Ok(Value::Bytes(b.clone())),
                Value::String(s) => Ok(Value::Bytes(s.as_bytes().to_vec())),
                Value::List(items) => items
                    .iter()
                    .map(|item| {
                        item.as_uint()
                            .and_then(|u| u8::try_from(u).ok())
                            .ok_or_else(|| out_of_range("bytes"))
                    })
                    .collect::<Result<Vec<u8>>>()
                    .map(Value::Bytes),
                _ => Err(out_of_range("bytes")),
            },
            _ => Ok(self.clone()),
        }
    }
}

fn integer_name(element: &ElementType) -> &'static str {
    match element {
        ElementType::I8 => "i8",
        ElementType::U8 => "u8",
        ElementType::I16 => "i16",
        ElementType::U16 => "u16",
        ElementType::I32 => "i32",
        ElementType::U32 => "u32",
        ElementType::I64 => "i64",
        _ => "u64",
    }
}

macro_rules! impl_from_value {
    ($variant:ident, $cast:ty, $($ty:ty),+) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v as $cast)
                }
            }
        )+
    };
}

impl_from_value!(Int, i64, i8, i16, i32, i64);
impl_from_value!(UInt, u64, u8, u16, u32, u64, usize);
impl_from_value!(Float, f64, f32, f64);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<ObjectValue> for Value {
    fn from(v: ObjectValue) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Composite value tagged with its concrete type
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectValue {
    type_name: String,
    fields: BTreeMap<String, Value>,
}

impl ObjectValue {
    /// Create an empty object of the given type
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder pattern: set a field
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Concrete type name
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Get a field value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Set a field value
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
    }

    /// Follow a dotted path through nested objects
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Check if field exists
    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterate over fields in name order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loose_equality_across_numeric_kinds() {
        assert!(Value::UInt(1).loosely_equals(&Value::Int(1)));
        assert!(Value::Int(1).loosely_equals(&Value::Float(1.0)));
        assert!(Value::Bool(true).loosely_equals(&Value::UInt(1)));
        assert!(!Value::UInt(2).loosely_equals(&Value::Int(1)));
        assert!(!Value::Int(-1).loosely_equals(&Value::UInt(u64::MAX)));
        assert!(Value::from("ab").loosely_equals(&Value::Bytes(b"ab".to_vec())));
    }

    #[test]
    fn test_loose_cmp() {
        assert_eq!(Value::Int(-3).loose_cmp(&Value::UInt(2)), Some(Ordering::Less));
        assert_eq!(Value::Float(2.5).loose_cmp(&Value::UInt(2)), Some(Ordering::Greater));
        assert_eq!(Value::from("b").loose_cmp(&Value::from("a")), Some(Ordering::Greater));
        assert_eq!(Value::from("a").loose_cmp(&Value::UInt(1)), None);
    }

    #[test]
    fn test_coerce_range_checks() {
        assert_eq!(Value::Int(200).coerce_to(&ElementType::U8).unwrap(), Value::UInt(200));
        assert!(Value::Int(300).coerce_to(&ElementType::U8).is_err());
        assert!(Value::Int(-1).coerce_to(&ElementType::U32).is_err());
        assert_eq!(Value::UInt(5).coerce_to(&ElementType::I16).unwrap(), Value::Int(5));
        assert_eq!(Value::UInt(1).coerce_to(&ElementType::Bool).unwrap(), Value::Bool(true));
        assert!(Value::Float(1.5).coerce_to(&ElementType::I32).is_err());
    }

    #[test]
    fn test_coerce_null_defaults() {
        assert_eq!(
            Value::Null.coerce_to(&ElementType::String).unwrap(),
            Value::String(String::new())
        );
        assert_eq!(Value::Null.coerce_to(&ElementType::U16).unwrap(), Value::UInt(0));
        assert_eq!(
            Value::List(vec![Value::UInt(1), Value::UInt(2)])
                .coerce_to(&ElementType::Bytes)
                .unwrap(),
            Value::Bytes(vec![1, 2])
        );
    }

    #[test]
    fn test_object_paths() {
        let inner = ObjectValue::new("Header").with("length", 7u32);
        let outer = ObjectValue::new("Packet").with("header", inner);
        assert_eq!(outer.get_path("header.length"), Some(&Value::UInt(7)));
        assert_eq!(outer.get_path("header.missing"), None);
        assert!(outer.has("header"));
    }

    #[test]
    fn test_object_equality_ignores_insertion_order() {
        let a = ObjectValue::new("T").with("x", 1u8).with("y", 2u8);
        let b = ObjectValue::new("T").with("y", 2u8).with("x", 1u8);
        assert_eq!(a, b);
    }

    #[test]
    fn test_as_usize() {
        assert_eq!(Value::UInt(12).as_usize().unwrap(), 12);
        assert!(Value::Int(-1).as_usize().is_err());
        assert!(Value::from("x").as_usize().is_err());
    }
}
