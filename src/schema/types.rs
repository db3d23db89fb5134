//! Schema Types - Element Types and Wire Representations
//!
//! Declared element types, the serialized-type tags that select a wire
//! representation, byte order and text codecs.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::schema::value::Value;

// ============================================================================
// Endianness
// ============================================================================

/// Wire byte order of multi-byte numbers, set per field or per serializer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Endian {
    Big,
    #[default]
    Little,
    /// Whatever the host uses
    Native,
}

impl Endian {
    /// Concrete order with `Native` replaced by the host's
    pub fn resolved(self) -> Endian {
        match self {
            Endian::Native if cfg!(target_endian = "big") => Endian::Big,
            Endian::Native => Endian::Little,
            order => order,
        }
    }

    #[inline]
    pub fn is_little(self) -> bool {
        self.resolved() == Endian::Little
    }
}

// ============================================================================
// Text Encoding
// ============================================================================

/// Text codec used for string fields
///
/// All supported codecs use a single zero byte as string terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Ascii,
    /// ISO-8859-1, one byte per code point below U+0100
    Latin1,
}

impl TextEncoding {
    /// Encode a string into bytes
    pub fn encode(self, text: &str) -> Result<Vec<u8>> {
        match self {
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Ascii => {
                if text.is_ascii() {
                    Ok(text.as_bytes().to_vec())
                } else {
                    Err(Error::InvalidData(format!(
                        "string {:?} is not ASCII",
                        text
                    )))
                }
            }
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c)).map_err(|_| {
                        Error::InvalidData(format!("character {:?} is not Latin-1", c))
                    })
                })
                .collect(),
        }
    }

    /// Decode bytes into a string
    pub fn decode(self, bytes: &[u8]) -> Result<String> {
        match self {
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| Error::InvalidData(format!("invalid UTF-8 string: {}", e))),
            TextEncoding::Ascii => {
                if bytes.is_ascii() {
                    Ok(bytes.iter().map(|&b| b as char).collect())
                } else {
                    Err(Error::InvalidData("invalid ASCII string".to_string()))
                }
            }
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

// ============================================================================
// Serialized Types
// ============================================================================

/// Wire representation of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SerializedType {
    /// Inferred from the element type
    #[default]
    Default,
    Int1,
    UInt1,
    Int2,
    UInt2,
    Int4,
    UInt4,
    Int8,
    UInt8,
    Float4,
    Float8,
    /// String followed by a zero byte
    NullTerminatedString,
    /// String occupying exactly its bound length, zero padded
    SizedString,
    /// String preceded by a 7-bit variable-length byte count
    LengthPrefixedString,
    /// Raw bytes filling the declared length or the rest of the bound
    ByteArray,
}

impl SerializedType {
    /// Size in bytes when the representation is data independent
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            SerializedType::Int1 | SerializedType::UInt1 => Some(1),
            SerializedType::Int2 | SerializedType::UInt2 => Some(2),
            SerializedType::Int4 | SerializedType::UInt4 | SerializedType::Float4 => Some(4),
            SerializedType::Int8 | SerializedType::UInt8 | SerializedType::Float8 => Some(8),
            _ => None,
        }
    }

    /// True for integer and floating point representations
    pub fn is_numeric(self) -> bool {
        self.fixed_size().is_some()
    }

    /// True for the string representations
    pub fn is_string(self) -> bool {
        matches!(
            self,
            SerializedType::NullTerminatedString
                | SerializedType::SizedString
                | SerializedType::LengthPrefixedString
        )
    }
}

impl fmt::Display for SerializedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// Element Types
// ============================================================================

/// Declared type of a field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    String,
    Bytes,
    /// Composite type registered under this name
    Object(String),
    /// Sequence of elements
    List(Box<ElementType>),
    /// Ordered key/value entries
    Map(Box<ElementType>, Box<ElementType>),
}

impl ElementType {
    /// Convenience constructor for object references
    pub fn object(type_name: impl Into<String>) -> Self {
        ElementType::Object(type_name.into())
    }

    /// Convenience constructor for lists
    pub fn list(element: ElementType) -> Self {
        ElementType::List(Box::new(element))
    }

    /// Convenience constructor for maps
    pub fn map(key: ElementType, value: ElementType) -> Self {
        ElementType::Map(Box::new(key), Box::new(value))
    }

    /// Serialized type used when a field declares none
    pub fn default_serialized_type(&self) -> SerializedType {
        match self {
            ElementType::Bool | ElementType::I8 => SerializedType::Int1,
            ElementType::U8 => SerializedType::UInt1,
            ElementType::I16 => SerializedType::Int2,
            ElementType::U16 => SerializedType::UInt2,
            ElementType::I32 => SerializedType::Int4,
            ElementType::U32 => SerializedType::UInt4,
            ElementType::I64 => SerializedType::Int8,
            ElementType::U64 => SerializedType::UInt8,
            ElementType::F32 => SerializedType::Float4,
            ElementType::F64 => SerializedType::Float8,
            ElementType::String => SerializedType::NullTerminatedString,
            ElementType::Bytes => SerializedType::ByteArray,
            _ => SerializedType::Default,
        }
    }

    /// Value held by a field that was never written or read
    pub fn default_value(&self) -> Value {
        match self {
            ElementType::Bool => Value::Bool(false),
            ElementType::I8 | ElementType::I16 | ElementType::I32 | ElementType::I64 => {
                Value::Int(0)
            }
            ElementType::U8 | ElementType::U16 | ElementType::U32 | ElementType::U64 => {
                Value::UInt(0)
            }
            ElementType::F32 | ElementType::F64 => Value::Float(0.0),
            ElementType::String => Value::String(String::new()),
            ElementType::Bytes => Value::Bytes(Vec::new()),
            ElementType::Object(_) => Value::Null,
            ElementType::List(_) => Value::List(Vec::new()),
            ElementType::Map(_, _) => Value::Map(Vec::new()),
        }
    }

    /// Inclusive integer range for integral element types
    pub fn integer_bounds(&self) -> Option<(i128, i128)> {
        match self {
            ElementType::I8 => Some((i8::MIN.into(), i8::MAX.into())),
            ElementType::U8 => Some((0, u8::MAX.into())),
            ElementType::I16 => Some((i16::MIN.into(), i16::MAX.into())),
            ElementType::U16 => Some((0, u16::MAX.into())),
            ElementType::I32 => Some((i32::MIN.into(), i32::MAX.into())),
            ElementType::U32 => Some((0, u32::MAX.into())),
            ElementType::I64 => Some((i64::MIN.into(), i64::MAX.into())),
            ElementType::U64 => Some((0, u64::MAX.into())),
            _ => None,
        }
    }

    /// True for booleans, integers and floats
    pub fn is_scalar_number(&self) -> bool {
        self.integer_bounds().is_some()
            || matches!(self, ElementType::Bool | ElementType::F32 | ElementType::F64)
    }

    /// Narrowest element type able to hold a constant
    pub fn for_value(value: &Value) -> ElementType {
        match value {
            Value::Int(_) => [ElementType::I8, ElementType::I16, ElementType::I32]
                .into_iter()
                .find(|e| value.coerce_to(e).is_ok())
                .unwrap_or(ElementType::I64),
            Value::Bool(_) => ElementType::Bool,
            Value::Float(_) => ElementType::F64,
            Value::String(_) => ElementType::String,
            Value::Bytes(_) => ElementType::Bytes,
            Value::UInt(n) if *n > u64::from(u32::MAX) => ElementType::U64,
            Value::UInt(n) if *n > u64::from(u16::MAX) => ElementType::U32,
            Value::UInt(n) if *n > u64::from(u8::MAX) => ElementType::U16,
            _ => ElementType::U8,
        }
    }

    /// True for lists and maps
    pub fn is_collection(&self) -> bool {
        matches!(self, ElementType::List(_) | ElementType::Map(_, _))
    }

    /// Check that a serialized type can encode this element type
    pub fn accepts(&self, serialized: SerializedType) -> bool {
        match serialized {
            SerializedType::Default => true,
            s if s.is_numeric() => self.is_scalar_number(),
            s if s.is_string() => matches!(self, ElementType::String),
            SerializedType::ByteArray => matches!(self, ElementType::Bytes),
            _ => false,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Object(name) => write!(f, "{}", name),
            ElementType::List(element) => write!(f, "list<{}>", element),
            ElementType::Map(key, value) => write!(f, "map<{}, {}>", key, value),
            other => write!(f, "{}", format!("{:?}", other).to_lowercase()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_sizes() {
        assert_eq!(SerializedType::UInt1.fixed_size(), Some(1));
        assert_eq!(SerializedType::Int4.fixed_size(), Some(4));
        assert_eq!(SerializedType::Float8.fixed_size(), Some(8));
        assert_eq!(SerializedType::SizedString.fixed_size(), None);
    }

    #[test]
    fn test_default_serialized_types() {
        assert_eq!(ElementType::Bool.default_serialized_type(), SerializedType::Int1);
        assert_eq!(ElementType::U16.default_serialized_type(), SerializedType::UInt2);
        assert_eq!(
            ElementType::String.default_serialized_type(),
            SerializedType::NullTerminatedString
        );
        assert_eq!(ElementType::Bytes.default_serialized_type(), SerializedType::ByteArray);
        assert_eq!(
            ElementType::object("Packet").default_serialized_type(),
            SerializedType::Default
        );
    }

    #[test]
    fn test_accepts() {
        assert!(ElementType::U32.accepts(SerializedType::UInt1));
        assert!(ElementType::Bool.accepts(SerializedType::Int4));
        assert!(ElementType::String.accepts(SerializedType::SizedString));
        assert!(!ElementType::String.accepts(SerializedType::UInt4));
        assert!(!ElementType::Bytes.accepts(SerializedType::NullTerminatedString));
    }

    #[test]
    fn test_native_endian_resolves_to_host() {
        assert!(Endian::Little.is_little());
        assert!(!Endian::Big.is_little());
        assert_ne!(Endian::Native.resolved(), Endian::Native);
        assert_eq!(Endian::Native.is_little(), cfg!(target_endian = "little"));
    }

    #[test]
    fn test_sentinel_constant_types() {
        assert_eq!(ElementType::for_value(&Value::UInt(0)), ElementType::U8);
        assert_eq!(ElementType::for_value(&Value::UInt(0xFFFF)), ElementType::U16);
        assert_eq!(ElementType::for_value(&Value::UInt(0x1_0000)), ElementType::U32);
        assert_eq!(ElementType::for_value(&Value::Int(-1)), ElementType::I8);
        assert_eq!(ElementType::for_value(&Value::Int(-300)), ElementType::I16);
        assert_eq!(ElementType::for_value(&Value::String("end".into())), ElementType::String);
    }

    #[test]
    fn test_latin1_roundtrip() {
        let bytes = TextEncoding::Latin1.encode("caf\u{e9}").unwrap();
        assert_eq!(bytes, vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(TextEncoding::Latin1.decode(&bytes).unwrap(), "caf\u{e9}");
    }

    #[test]
    fn test_ascii_rejects_non_ascii() {
        assert!(TextEncoding::Ascii.encode("caf\u{e9}").is_err());
        assert!(TextEncoding::Ascii.decode(&[0xE9]).is_err());
    }

    #[test]
    fn test_element_display() {
        assert_eq!(ElementType::U8.to_string(), "u8");
        assert_eq!(ElementType::list(ElementType::String).to_string(), "list<string>");
        assert_eq!(
            ElementType::map(ElementType::String, ElementType::object("Item")).to_string(),
            "map<string, Item>"
        );
    }
}
