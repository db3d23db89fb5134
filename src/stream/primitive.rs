//! Primitive codecs
//!
//! Fixed-width numbers, 7-bit variable-length integers and the scalar
//! representations selected by [`SerializedType`].

use crate::error::{Error, Result};
use crate::schema::types::{ElementType, Endian, SerializedType, TextEncoding};
use crate::schema::value::Value;
use crate::stream::reader::BoundedReader;
use crate::stream::writer::BoundedWriter;

// ============================================================================
// Fixed-Width Numbers
// ============================================================================

/// Fixed-width number with a byte-order aware wire form
pub trait Primitive: Sized + Copy {
    /// Encoded size in bytes
    const SIZE: usize;

    fn encode(self, writer: &mut BoundedWriter, endian: Endian) -> Result<()>;

    fn decode(reader: &mut BoundedReader, endian: Endian) -> Result<Self>;
}

/// Helper macro for implementing Primitive on number types
macro_rules! impl_primitive {
    ($ty:ty, $size:expr) => {
        impl Primitive for $ty {
            const SIZE: usize = $size;

            fn encode(self, writer: &mut BoundedWriter, endian: Endian) -> Result<()> {
                let bytes = if endian.is_little() {
                    self.to_le_bytes()
                } else {
                    self.to_be_bytes()
                };
                writer.write_bytes(&bytes)
            }

            fn decode(reader: &mut BoundedReader, endian: Endian) -> Result<Self> {
                let mut arr = [0u8; $size];
                arr.copy_from_slice(reader.read_bytes($size)?);
                Ok(if endian.is_little() {
                    Self::from_le_bytes(arr)
                } else {
                    Self::from_be_bytes(arr)
                })
            }
        }
    };
}

impl_primitive!(u8, 1);
impl_primitive!(u16, 2);
impl_primitive!(u32, 4);
impl_primitive!(u64, 8);
impl_primitive!(i8, 1);
impl_primitive!(i16, 2);
impl_primitive!(i32, 4);
impl_primitive!(i64, 8);
impl_primitive!(f32, 4);
impl_primitive!(f64, 8);

/// Integral view of a value for integer encodings
fn integral(value: &Value, target: &'static str) -> Result<i128> {
    let n = match value {
        Value::Int(i) => Some(i128::from(*i)),
        Value::UInt(u) => Some(i128::from(*u)),
        Value::Bool(b) => Some(i128::from(*b)),
        Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i128),
        Value::Null => Some(0),
        _ => None,
    };
    n.ok_or_else(|| Error::ValueOutOfRange {
        value: format!("{:?}", value),
        target,
    })
}

macro_rules! write_int {
    ($writer:expr, $value:expr, $endian:expr, $ty:ty, $name:expr) => {{
        let n = integral($value, $name)?;
        let narrowed = <$ty>::try_from(n).map_err(|_| Error::ValueOutOfRange {
            value: n.to_string(),
            target: $name,
        })?;
        narrowed.encode($writer, $endian)
    }};
}

/// Write a number using a fixed-width serialized type
pub fn write_number(
    writer: &mut BoundedWriter,
    serialized: SerializedType,
    value: &Value,
    endian: Endian,
) -> Result<()> {
    match serialized {
        SerializedType::Int1 => write_int!(writer, value, endian, i8, "int1"),
        SerializedType::UInt1 => write_int!(writer, value, endian, u8, "uint1"),
        SerializedType::Int2 => write_int!(writer, value, endian, i16, "int2"),
        SerializedType::UInt2 => write_int!(writer, value, endian, u16, "uint2"),
        SerializedType::Int4 => write_int!(writer, value, endian, i32, "int4"),
        SerializedType::UInt4 => write_int!(writer, value, endian, u32, "uint4"),
        SerializedType::Int8 => write_int!(writer, value, endian, i64, "int8"),
        SerializedType::UInt8 => write_int!(writer, value, endian, u64, "uint8"),
        SerializedType::Float4 | SerializedType::Float8 => {
            let f = match value {
                Value::Null => 0.0,
                other => other.as_float().ok_or_else(|| Error::ValueOutOfRange {
                    value: format!("{:?}", other),
                    target: "float",
                })?,
            };
            if serialized == SerializedType::Float4 {
                (f as f32).encode(writer, endian)
            } else {
                f.encode(writer, endian)
            }
        }
        other => Err(Error::NotSupported(format!("{} is not a number encoding", other))),
    }
}

/// Read a number using a fixed-width serialized type
pub fn read_number(
    reader: &mut BoundedReader,
    serialized: SerializedType,
    endian: Endian,
) -> Result<Value> {
    Ok(match serialized {
        SerializedType::Int1 => Value::Int(i8::decode(reader, endian)?.into()),
        SerializedType::UInt1 => Value::UInt(u8::decode(reader, endian)?.into()),
        SerializedType::Int2 => Value::Int(i16::decode(reader, endian)?.into()),
        SerializedType::UInt2 => Value::UInt(u16::decode(reader, endian)?.into()),
        SerializedType::Int4 => Value::Int(i32::decode(reader, endian)?.into()),
        SerializedType::UInt4 => Value::UInt(u32::decode(reader, endian)?.into()),
        SerializedType::Int8 => Value::Int(i64::decode(reader, endian)?),
        SerializedType::UInt8 => Value::UInt(u64::decode(reader, endian)?),
        SerializedType::Float4 => Value::Float(f32::decode(reader, endian)?.into()),
        SerializedType::Float8 => Value::Float(f64::decode(reader, endian)?),
        other => {
            return Err(Error::NotSupported(format!(
                "{} is not a number encoding",
                other
            )))
        }
    })
}

// ============================================================================
// Variable-Length Integers
// ============================================================================

/// Write an unsigned integer in 7-bit groups, low group first
pub fn write_varint(writer: &mut BoundedWriter, mut value: u64) -> Result<()> {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            return writer.write_byte(byte);
        }
        writer.write_byte(byte | 0x80)?;
    }
}

/// Read an unsigned integer written by [`write_varint`]
pub fn read_varint(reader: &mut BoundedReader) -> Result<u64> {
    let mut result = 0u64;
    for shift in (0..64).step_by(7) {
        let byte = reader.read_byte()?;
        result |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(Error::InvalidData("variable-length integer is too long".to_string()))
}

// ============================================================================
// Scalar Values
// ============================================================================

/// Write a scalar value using its serialized representation
pub fn write_value(
    writer: &mut BoundedWriter,
    element: &ElementType,
    serialized: SerializedType,
    value: &Value,
    endian: Endian,
    encoding: TextEncoding,
) -> Result<()> {
    if serialized.is_numeric() {
        let value = value.coerce_to(element)?;
        return write_number(writer, serialized, &value, endian);
    }

    match serialized {
        SerializedType::NullTerminatedString => {
            let bytes = text_bytes(value, encoding)?;
            if bytes.contains(&0) {
                return Err(Error::InvalidData(
                    "null-terminated string contains a zero byte".to_string(),
                ));
            }
            writer.write_bytes(&bytes)?;
            writer.write_byte(0)
        }
        SerializedType::SizedString => writer.write_bytes(&text_bytes(value, encoding)?),
        SerializedType::LengthPrefixedString => {
            let bytes = text_bytes(value, encoding)?;
            write_varint(writer, bytes.len() as u64)?;
            writer.write_bytes(&bytes)
        }
        SerializedType::ByteArray => match value.coerce_to(&ElementType::Bytes)? {
            Value::Bytes(bytes) => writer.write_bytes(&bytes),
            other => Err(Error::InvalidData(format!("expected bytes, found {:?}", other))),
        },
        other => Err(Error::NotSupported(format!(
            "{} cannot be written as a scalar",
            other
        ))),
    }
}

/// Read a scalar value using its serialized representation
pub fn read_value(
    reader: &mut BoundedReader,
    element: &ElementType,
    serialized: SerializedType,
    endian: Endian,
    encoding: TextEncoding,
) -> Result<Value> {
    if serialized.is_numeric() {
        return read_number(reader, serialized, endian)?.coerce_to(element);
    }

    match serialized {
        SerializedType::NullTerminatedString => {
            Ok(Value::String(encoding.decode(reader.read_until_zero()?)?))
        }
        SerializedType::SizedString => {
            let bytes = reader.read_remaining();
            let text = match bytes.iter().position(|&b| b == 0) {
                Some(end) => &bytes[..end],
                None => bytes,
            };
            Ok(Value::String(encoding.decode(text)?))
        }
        SerializedType::LengthPrefixedString => {
            let len = usize::try_from(read_varint(reader)?).map_err(|_| {
                Error::InvalidData("string length does not fit in memory".to_string())
            })?;
            Ok(Value::String(encoding.decode(reader.read_bytes(len)?)?))
        }
        SerializedType::ByteArray => Ok(Value::Bytes(reader.read_remaining().to_vec())),
        other => Err(Error::NotSupported(format!(
            "{} cannot be read as a scalar",
            other
        ))),
    }
}

fn text_bytes(value: &Value, encoding: TextEncoding) -> Result<Vec<u8>> {
    match value {
        Value::String(s) => encoding.encode(s),
        Value::Null => Ok(Vec::new()),
        other => Err(Error::InvalidData(format!("expected a string, found {:?}", other))),
    }
}
