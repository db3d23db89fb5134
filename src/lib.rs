//! structwire - Declarative Binary Serialization
//!
//! Types are described once through a [`TypeRegistry`]:
//! - Field order, byte order and text codecs per field
//! - Lengths, counts and offsets, constant or bound to other fields
//! - Conditional fields and polymorphic subtypes chosen by a discriminant
//! - Collections ended by a count, a sentinel or a terminating item
//!
//! A [`BinarySerializer`] builds an immutable type graph per root type and
//! walks it against a value graph on every call. Bindings are two-way: a
//! length prefix bound to a payload is recomputed from the payload when
//! serializing and bounds the payload when deserializing.

pub mod error;
pub mod graph;
pub mod observer;
pub mod schema;
pub mod serializer;
pub mod stream;

// Re-export commonly used types
pub use error::{Error, ObserverError, Result, SchemaError};
pub use graph::{TypeGraph, ValueGraph};
pub use observer::{BindingContext, MemberEvent, SerializationObserver, TracingObserver};
pub use serializer::{BinaryRecord, BinarySerializer, SerializerConfig};

// Re-export schema description types
pub use schema::{
    // Bindings
    Binding, BindingInfo, BindingMode, ComparisonOperator, Condition, ItemTermination,
    LastItemMode, RelativeSourceMode, ScaleConverter, ValueConverter,
    // Descriptors
    FieldAccessor, FieldAttribute, FieldDescriptor, ObjectDescriptor, TypeRegistry,
    // Types and values
    ElementType, Endian, ObjectValue, SerializedType, TextEncoding, Value,
};
