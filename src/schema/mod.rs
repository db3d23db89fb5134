//! Schema Module - Declarative Type Descriptions
//!
//! The description interface consumed by the engine:
//!
//! 1. **Types** - element types, serialized-type tags, byte order, text codecs
//! 2. **Values** - the dynamic value model exchanged with hosts
//! 3. **Bindings** - relative references between fields
//! 4. **Descriptors** - fields, attributes, accessors and the type registry

pub mod binding;
pub mod descriptor;
pub mod types;
pub mod value;

pub use binding::{
    Binding, BindingInfo, BindingMode, ComparisonOperator, Condition, ItemTermination,
    LastItemMode, RelativeSourceMode, ScaleConverter, ValueConverter,
};
pub use descriptor::{
    FieldAccessor, FieldAttribute, FieldDescriptor, ObjectDescriptor, TypeRegistry,
};
pub use types::{ElementType, Endian, SerializedType, TextEncoding};
pub use value::{ObjectValue, Value};
