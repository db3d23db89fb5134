//! Schema Descriptors - Field and Type Declarations
//!
//! Hosts describe their types with [`ObjectDescriptor`]s made of
//! [`FieldDescriptor`]s and register them in a [`TypeRegistry`]. Each field
//! carries a list of [`FieldAttribute`]s plus the accessor used to read and
//! write it on an [`ObjectValue`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::SchemaError;
use crate::schema::binding::{
    Binding, BindingInfo, ComparisonOperator, Condition, ItemTermination, LastItemMode,
};
use crate::schema::types::{ElementType, Endian, SerializedType, TextEncoding};
use crate::schema::value::{ObjectValue, Value};

// ============================================================================
// Field Attributes
// ============================================================================

/// Serialization metadata attached to a field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldAttribute {
    /// Position among siblings; unordered fields come last
    Order(i32),
    /// Explicit wire representation
    SerializeAs(SerializedType),
    Endianness(Endian),
    Encoding(TextEncoding),
    /// Byte length of the field
    FieldLength(Binding),
    /// Byte length of every item of a collection
    ItemLength(Binding),
    /// Number of items (byte count for strings and byte arrays)
    FieldCount(Binding),
    /// Absolute stream position of the field
    FieldOffset(Binding),
    /// One entry of a discriminant-to-subtype table
    Subtype {
        binding: BindingInfo,
        value: Value,
        subtype: String,
    },
    /// Presence predicate; several are combined with OR
    SerializeWhen(Condition),
    /// Collection ends with a sentinel; without an element type the sentinel
    /// takes the item type when the value fits it
    SerializeUntil {
        value: Binding,
        element: Option<ElementType>,
    },
    /// Collection ends after the item matching a value
    ItemSerializeUntil(ItemTermination),
    /// Field is skipped entirely
    Ignore,
}

impl FieldAttribute {
    /// Attribute name used in schema errors
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldAttribute::Order(_) => "order",
            FieldAttribute::SerializeAs(_) => "serialize-as",
            FieldAttribute::Endianness(_) => "endianness",
            FieldAttribute::Encoding(_) => "encoding",
            FieldAttribute::FieldLength(_) => "field-length",
            FieldAttribute::ItemLength(_) => "item-length",
            FieldAttribute::FieldCount(_) => "field-count",
            FieldAttribute::FieldOffset(_) => "field-offset",
            FieldAttribute::Subtype { .. } => "subtype",
            FieldAttribute::SerializeWhen(_) => "serialize-when",
            FieldAttribute::SerializeUntil { .. } => "serialize-until",
            FieldAttribute::ItemSerializeUntil(_) => "item-serialize-until",
            FieldAttribute::Ignore => "ignore",
        }
    }

    /// True when at most one attribute of this kind may appear on a field
    pub fn is_exclusive(&self) -> bool {
        !matches!(
            self,
            FieldAttribute::Subtype { .. } | FieldAttribute::SerializeWhen(_)
        )
    }
}

// ============================================================================
// Field Accessors
// ============================================================================

type Getter = Arc<dyn Fn(&ObjectValue) -> Value + Send + Sync>;
type Setter = Arc<dyn Fn(&mut ObjectValue, Value) + Send + Sync>;

/// Getter/setter pair reading and writing a field on a host value
#[derive(Clone)]
pub struct FieldAccessor {
    getter: Getter,
    setter: Setter,
}

impl FieldAccessor {
    /// Read and write the object slot with the given name
    pub fn slot(name: &str) -> Self {
        let get_name = name.to_string();
        let set_name = name.to_string();
        Self {
            getter: Arc::new(move |object| object.get(&get_name).cloned().unwrap_or_default()),
            setter: Arc::new(move |object, value| object.set(&set_name, value)),
        }
    }

    /// Custom accessor pair
    pub fn new(
        getter: impl Fn(&ObjectValue) -> Value + Send + Sync + 'static,
        setter: impl Fn(&mut ObjectValue, Value) + Send + Sync + 'static,
    ) -> Self {
        Self {
            getter: Arc::new(getter),
            setter: Arc::new(setter),
        }
    }

    pub fn get(&self, object: &ObjectValue) -> Value {
        (self.getter)(object)
    }

    pub fn set(&self, object: &mut ObjectValue, value: Value) {
        (self.setter)(object, value)
    }
}

impl fmt::Debug for FieldAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldAccessor")
    }
}

// ============================================================================
// Field Descriptors
// ============================================================================

/// One declared field
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Field name
    pub name: String,
    /// Declared element type
    pub element_type: ElementType,
    /// Serialization metadata
    pub attributes: Vec<FieldAttribute>,
    pub accessor: FieldAccessor,
    /// Value used when the field is absent from the stream
    pub default: Option<Value>,
}

impl FieldDescriptor {
    /// Create a field stored in the same-named slot
    pub fn new(name: &str, element_type: ElementType) -> Self {
        Self {
            name: name.to_string(),
            element_type,
            attributes: Vec::new(),
            accessor: FieldAccessor::slot(name),
            default: None,
        }
    }

    /// Add an arbitrary attribute
    pub fn attribute(mut self, attribute: FieldAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_order(self, order: i32) -> Self {
        self.attribute(FieldAttribute::Order(order))
    }

    pub fn serialize_as(self, serialized: SerializedType) -> Self {
        self.attribute(FieldAttribute::SerializeAs(serialized))
    }

    pub fn with_endianness(self, endian: Endian) -> Self {
        self.attribute(FieldAttribute::Endianness(endian))
    }

    pub fn with_encoding(self, encoding: TextEncoding) -> Self {
        self.attribute(FieldAttribute::Encoding(encoding))
    }

    /// Byte length from a constant or a bound field
    pub fn with_length(self, length: impl Into<Binding>) -> Self {
        self.attribute(FieldAttribute::FieldLength(length.into()))
    }

    pub fn with_item_length(self, length: impl Into<Binding>) -> Self {
        self.attribute(FieldAttribute::ItemLength(length.into()))
    }

    pub fn with_count(self, count: impl Into<Binding>) -> Self {
        self.attribute(FieldAttribute::FieldCount(count.into()))
    }

    pub fn with_offset(self, offset: impl Into<Binding>) -> Self {
        self.attribute(FieldAttribute::FieldOffset(offset.into()))
    }

    /// Add a discriminant-to-subtype entry
    pub fn with_subtype(
        self,
        binding: BindingInfo,
        value: impl Into<Value>,
        subtype: &str,
    ) -> Self {
        self.attribute(FieldAttribute::Subtype {
            binding,
            value: value.into(),
            subtype: subtype.to_string(),
        })
    }

    /// Present only when the bound value equals `value`
    pub fn when(self, binding: BindingInfo, value: impl Into<Value>) -> Self {
        self.attribute(FieldAttribute::SerializeWhen(Condition::new(binding, value)))
    }

    /// Present only when the bound value compares to `value`
    pub fn when_compare(
        self,
        binding: BindingInfo,
        operator: ComparisonOperator,
        value: impl Into<Value>,
    ) -> Self {
        self.attribute(FieldAttribute::SerializeWhen(
            Condition::new(binding, value).with_operator(operator),
        ))
    }

    /// Terminate a collection with a sentinel typed after the items
    pub fn until(self, value: impl Into<Value>) -> Self {
        self.attribute(FieldAttribute::SerializeUntil {
            value: Binding::Const(value.into()),
            element: None,
        })
    }

    /// Terminate a collection with a sentinel of an explicit type
    pub fn until_typed(self, value: impl Into<Binding>, element: ElementType) -> Self {
        self.attribute(FieldAttribute::SerializeUntil {
            value: value.into(),
            element: Some(element),
        })
    }

    /// Terminate a collection with a zero byte
    pub fn terminated(self) -> Self {
        self.until(Value::UInt(0))
    }

    /// Stop after the item whose member at `path` equals `value`
    pub fn item_until(
        self,
        path: &str,
        value: impl Into<Binding>,
        mode: LastItemMode,
    ) -> Self {
        self.attribute(FieldAttribute::ItemSerializeUntil(ItemTermination {
            path: path.to_string(),
            value: value.into(),
            mode,
        }))
    }

    pub fn ignored(self) -> Self {
        self.attribute(FieldAttribute::Ignore)
    }

    pub fn with_accessor(mut self, accessor: FieldAccessor) -> Self {
        self.accessor = accessor;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

// ============================================================================
// Object Descriptors
// ============================================================================

/// A composite type and its declared fields
#[derive(Debug, Clone)]
pub struct ObjectDescriptor {
    /// Type name
    pub type_name: String,
    /// Base type whose fields precede this type's own
    pub base: Option<String>,
    /// Abstract types are only instantiated through subtypes
    pub is_abstract: bool,
    /// Fields in declaration order
    pub fields: Vec<FieldDescriptor>,
}

impl ObjectDescriptor {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            base: None,
            is_abstract: false,
            fields: Vec::new(),
        }
    }

    /// Builder pattern: inherit from a base type
    pub fn extends(mut self, base: &str) -> Self {
        self.base = Some(base.to_string());
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Builder pattern: add a field
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Get a field by name
    pub fn get_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

// ============================================================================
// Type Registry
// ============================================================================

/// All object types known to a serializer
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, ObjectDescriptor>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type
    pub fn register(&mut self, descriptor: ObjectDescriptor) -> Result<(), SchemaError> {
        if self.types.contains_key(&descriptor.type_name) {
            return Err(SchemaError::DuplicateType(descriptor.type_name));
        }
        self.types.insert(descriptor.type_name.clone(), descriptor);
        Ok(())
    }

    /// Builder pattern: register a type
    pub fn with(mut self, descriptor: ObjectDescriptor) -> Result<Self, SchemaError> {
        self.register(descriptor)?;
        Ok(self)
    }

    pub fn get(&self, type_name: &str) -> Option<&ObjectDescriptor> {
        self.types.get(type_name)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Base chain of a type, starting with the type itself
    pub fn lineage(&self, type_name: &str) -> Result<Vec<&ObjectDescriptor>, SchemaError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(type_name);

        while let Some(name) = current {
            if !seen.insert(name) {
                return Err(SchemaError::CyclicInheritance(type_name.to_string()));
            }
            let descriptor = self
                .get(name)
                .ok_or_else(|| SchemaError::UnknownType(name.to_string()))?;
            chain.push(descriptor);
            current = descriptor.base.as_deref();
        }
        Ok(chain)
    }

    /// True if `derived` is `base` or inherits from it
    pub fn is_derived_from(&self, derived: &str, base: &str) -> bool {
        self.lineage(derived)
            .map(|chain| chain.iter().any(|d| d.type_name == base))
            .unwrap_or(false)
    }

    /// Registered types deriving from `base`, excluding `base`, in name order
    pub fn derived_types(&self, base: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .types
            .keys()
            .map(String::as_str)
            .filter(|name| *name != base && self.is_derived_from(name, base))
            .collect();
        names.sort_unstable();
        names
    }

    /// Fields of a type with inherited fields first
    pub fn all_fields(&self, type_name: &str) -> Result<Vec<&FieldDescriptor>, SchemaError> {
        let chain = self.lineage(type_name)?;
        let mut names = HashSet::new();
        let mut fields = Vec::new();

        for descriptor in chain.iter().rev() {
            for field in &descriptor.fields {
                if !names.insert(field.name.as_str()) {
                    return Err(SchemaError::DuplicateField {
                        type_name: type_name.to_string(),
                        field: field.name.clone(),
                    });
                }
                fields.push(field);
            }
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::new()
            .with(
                ObjectDescriptor::new("Shape")
                    .abstract_type()
                    .field(FieldDescriptor::new("id", ElementType::U16)),
            )
            .unwrap()
            .with(
                ObjectDescriptor::new("Circle")
                    .extends("Shape")
                    .field(FieldDescriptor::new("radius", ElementType::F32)),
            )
            .unwrap()
            .with(
                ObjectDescriptor::new("Square")
                    .extends("Shape")
                    .field(FieldDescriptor::new("side", ElementType::F32)),
            )
            .unwrap()
    }

    #[test]
    fn test_inherited_fields_come_first() {
        let registry = registry();
        let names: Vec<&str> = registry
            .all_fields("Circle")
            .unwrap()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "radius"]);
    }

    #[test]
    fn test_derivation() {
        let registry = registry();
        assert!(registry.is_derived_from("Circle", "Shape"));
        assert!(registry.is_derived_from("Shape", "Shape"));
        assert!(!registry.is_derived_from("Shape", "Circle"));
        assert_eq!(registry.derived_types("Shape"), vec!["Circle", "Square"]);
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut registry = registry();
        let err = registry.register(ObjectDescriptor::new("Circle")).unwrap_err();
        assert_eq!(err, SchemaError::DuplicateType("Circle".into()));
    }

    #[test]
    fn test_cyclic_inheritance_detected() {
        let registry = TypeRegistry::new()
            .with(ObjectDescriptor::new("A").extends("B"))
            .unwrap()
            .with(ObjectDescriptor::new("B").extends("A"))
            .unwrap();
        assert!(matches!(
            registry.all_fields("A"),
            Err(SchemaError::CyclicInheritance(_))
        ));
    }

    #[test]
    fn test_shadowed_field_rejected() {
        let registry = registry()
            .with(
                ObjectDescriptor::new("Dot")
                    .extends("Shape")
                    .field(FieldDescriptor::new("id", ElementType::U8)),
            )
            .unwrap();
        assert!(matches!(
            registry.all_fields("Dot"),
            Err(SchemaError::DuplicateField { .. })
        ));
    }

    #[test]
    fn test_until_leaves_sentinel_type_open() {
        let field = FieldDescriptor::new("items", ElementType::list(ElementType::U16)).until(-1i16);
        match &field.attributes[0] {
            FieldAttribute::SerializeUntil { element, value } => {
                assert_eq!(*element, None);
                assert_eq!(*value, Binding::Const(Value::Int(-1)));
            }
            other => panic!("unexpected attribute {:?}", other),
        }

        let field = FieldDescriptor::new("items", ElementType::list(ElementType::U8))
            .until_typed(Value::UInt(0xFFFF), ElementType::U16);
        assert!(matches!(
            &field.attributes[0],
            FieldAttribute::SerializeUntil { element: Some(ElementType::U16), .. }
        ));
    }

    #[test]
    fn test_custom_accessor() {
        let field = FieldDescriptor::new("flag", ElementType::Bool).with_accessor(FieldAccessor::new(
            |o| Value::Bool(o.get("raw").and_then(Value::as_uint) == Some(1)),
            |o, v| o.set("raw", if v.as_bool() == Some(true) { 1u8 } else { 0u8 }),
        ));
        let mut object = ObjectValue::new("T").with("raw", 1u8);
        assert_eq!(field.accessor.get(&object), Value::Bool(true));
        field.accessor.set(&mut object, Value::Bool(false));
        assert_eq!(object.get("raw"), Some(&Value::UInt(0)));
    }
}
