//! Binding Resolver
//!
//! Locates the source of a binding by walking the value graph's parent
//! chain. Only object nodes count as levels: level 1 is the object that
//! declares the bound field, level 2 the object enclosing that one.

use std::iter;

use crate::error::{Error, Result};
use crate::graph::type_graph::NodeKind;
use crate::graph::value_graph::{ValueGraph, ValueId};
use crate::schema::binding::{Binding, BindingInfo, RelativeSourceMode};
use crate::schema::types::ElementType;
use crate::schema::value::Value;

/// Where a binding points
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// A node of the value graph
    Node(ValueId),
    /// A member of the call context (read-only)
    Context(Value),
}

impl<'g> ValueGraph<'g> {
    fn is_object(&self, id: ValueId) -> bool {
        matches!(self.schema(id).kind, NodeKind::Object { .. })
    }

    /// Object nodes above `id`, nearest first
    pub fn enclosing_objects(&self, id: ValueId) -> impl Iterator<Item = ValueId> + '_ {
        iter::successors(self.node(id).parent, move |n| self.node(*n).parent)
            .filter(move |n| self.is_object(*n))
    }

    /// True if an object node's concrete or declared type is `type_name`
    fn object_is_a(&self, id: ValueId, type_name: &str) -> bool {
        let declared = match &self.schema(id).element_type {
            ElementType::Object(name) => name == type_name,
            _ => false,
        };
        declared
            || self
                .layout_of(id)
                .is_some_and(|layout| self.types().layout(layout).is_a(type_name))
    }

    /// Locate the source of a binding declared on `id`
    pub fn locate(&self, id: ValueId, info: &BindingInfo) -> Result<Source> {
        self.locate_among(self.enclosing_objects(id), info)
    }

    /// Locate a binding as seen from a member of `object`
    pub fn locate_from_object(&self, object: ValueId, info: &BindingInfo) -> Result<Source> {
        self.locate_among(iter::once(object).chain(self.enclosing_objects(object)), info)
    }

    fn locate_among(
        &self,
        mut objects: impl Iterator<Item = ValueId>,
        info: &BindingInfo,
    ) -> Result<Source> {
        info.validate()?;
        let unresolved = |reason: String| Error::BindingResolution {
            path: info.path.clone(),
            reason,
        };

        let start = match (
            info.relative_source,
            info.ancestor_level,
            info.ancestor_type.as_deref(),
        ) {
            (RelativeSourceMode::SerializationContext, _, _) => {
                return self.context_member(info).map(Source::Context)
            }
            (RelativeSourceMode::FindAncestor, None, Some(type_name)) => objects
                .find(|object| self.object_is_a(*object, type_name))
                .ok_or_else(|| unresolved(format!("no enclosing object of type '{}'", type_name)))?,
            (RelativeSourceMode::FindAncestor, Some(level), _) => objects
                .nth(level.saturating_sub(1))
                .ok_or_else(|| unresolved(format!("no enclosing object at level {}", level)))?,
            _ => objects
                .next()
                .ok_or_else(|| unresolved("no enclosing object".to_string()))?,
        };

        let mut current = start;
        for segment in info.path.split('.').filter(|s| !s.is_empty()) {
            current = self.child_by_name(current, segment).ok_or_else(|| {
                unresolved(format!(
                    "'{}' has no member '{}'",
                    self.type_name(current),
                    segment
                ))
            })?;
        }
        Ok(Source::Node(current))
    }

    fn context_member(&self, info: &BindingInfo) -> Result<Value> {
        let unresolved = |reason: &str| Error::BindingResolution {
            path: info.path.clone(),
            reason: reason.to_string(),
        };
        let context = self
            .context()
            .ok_or_else(|| unresolved("no serialization context was supplied"))?;
        if info.path.is_empty() {
            return Ok(context.clone());
        }
        context
            .as_object()
            .and_then(|object| object.get_path(&info.path))
            .cloned()
            .ok_or_else(|| unresolved("member not found in the serialization context"))
    }

    fn read_source(&self, source: Source, info: &BindingInfo) -> Result<Value> {
        let raw = match source {
            Source::Node(node) => self.value(node),
            Source::Context(value) => value,
        };
        info.convert(raw)
    }

    /// Read the value a binding declared on `id` points at
    pub fn resolve(&self, id: ValueId, info: &BindingInfo) -> Result<Value> {
        self.read_source(self.locate(id, info)?, info)
    }

    /// Read a binding as seen from a member of `object`
    pub fn resolve_from_object(&self, object: ValueId, info: &BindingInfo) -> Result<Value> {
        self.read_source(self.locate_from_object(object, info)?, info)
    }

    /// Constant or bound value
    pub fn resolve_binding(&self, id: ValueId, binding: &Binding) -> Result<Value> {
        match binding {
            Binding::Const(value) => Ok(value.clone()),
            Binding::Bound(info) => self.resolve(id, info),
        }
    }

    /// Constant or bound value interpreted as a length, count or offset
    pub fn resolve_usize(&self, id: ValueId, binding: &Binding) -> Result<usize> {
        self.resolve_binding(id, binding)?.as_usize()
    }

    /// Write a value back into the source of a two-way binding
    pub fn apply(&mut self, id: ValueId, info: &BindingInfo, value: Value) -> Result<()> {
        let unresolved = |reason: &str| Error::BindingResolution {
            path: info.path.clone(),
            reason: reason.to_string(),
        };
        match self.locate(id, info)? {
            Source::Context(_) => Err(unresolved("the serialization context is read-only")),
            Source::Node(source) => {
                let schema = self.schema(source);
                if !matches!(schema.kind, NodeKind::Value) {
                    return Err(unresolved("cannot write into a composite member"));
                }
                let value = info.convert_back(value)?.coerce_to(&schema.element_type)?;
                self.set_scalar(source, value);
                Ok(())
            }
        }
    }

    /// True when the node is not ignored and any of its conditions holds
    pub fn is_present(&self, id: ValueId) -> Result<bool> {
        let schema = self.schema(id);
        if schema.ignored {
            return Ok(false);
        }
        if schema.conditions.is_empty() {
            return Ok(true);
        }
        for condition in &schema.conditions {
            let value = self.resolve(id, &condition.binding)?;
            if condition.operator.apply(&value, &condition.value) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::type_graph::TypeGraph;
    use crate::schema::binding::ScaleConverter;
    use crate::schema::descriptor::{FieldDescriptor, ObjectDescriptor, TypeRegistry};
    use crate::schema::value::ObjectValue;

    fn nested() -> TypeGraph {
        let mut registry = TypeRegistry::new();
        registry
            .register(
                ObjectDescriptor::new("Outer")
                    .field(FieldDescriptor::new("version", ElementType::U8))
                    .field(FieldDescriptor::new("middle", ElementType::object("Middle"))),
            )
            .unwrap();
        registry
            .register(
                ObjectDescriptor::new("Middle")
                    .field(FieldDescriptor::new("size", ElementType::U16))
                    .field(FieldDescriptor::new(
                        "inners",
                        ElementType::list(ElementType::object("Inner")),
                    )),
            )
            .unwrap();
        registry
            .register(ObjectDescriptor::new("Inner").field(FieldDescriptor::new("value", ElementType::U8)))
            .unwrap();
        TypeGraph::build(&registry, "Outer").unwrap()
    }

    fn bound(types: &TypeGraph) -> (ValueGraph<'_>, ValueId) {
        let inner = ObjectValue::new("Inner").with("value", 7u8);
        let middle = ObjectValue::new("Middle")
            .with("size", 300u16)
            .with("inners", vec![Value::from(inner)]);
        let outer = ObjectValue::new("Outer").with("version", 2u8).with("middle", middle);

        let context = ObjectValue::new("Ctx").with("mode", 5u8);
        let mut values = ValueGraph::new(types, Some(context.into()), 16);
        let root = values.add_root().unwrap();
        values.assign(root, &outer.into()).unwrap();

        let middle = values.child_by_name(root, "middle").unwrap();
        let inners = values.child_by_name(middle, "inners").unwrap();
        let inner = values.items(inners)[0];
        let value = values.child_by_name(inner, "value").unwrap();
        (values, value)
    }

    #[test]
    fn test_self_and_ancestor_levels() {
        let types = nested();
        let (values, leaf) = bound(&types);

        assert_eq!(values.resolve(leaf, &BindingInfo::path("value")).unwrap(), Value::UInt(7));
        assert_eq!(
            values.resolve(leaf, &BindingInfo::path("size").ancestor(2)).unwrap(),
            Value::UInt(300)
        );
        assert_eq!(
            values.resolve(leaf, &BindingInfo::path("version").ancestor(3)).unwrap(),
            Value::UInt(2)
        );
        assert!(matches!(
            values.resolve(leaf, &BindingInfo::path("version").ancestor(4)),
            Err(Error::BindingResolution { .. })
        ));
    }

    #[test]
    fn test_ancestor_by_type() {
        let types = nested();
        let (values, leaf) = bound(&types);
        let binding = BindingInfo::path("version").ancestor_of_type("Outer");
        assert_eq!(values.resolve(leaf, &binding).unwrap(), Value::UInt(2));

        let missing = BindingInfo::path("version").ancestor_of_type("Nowhere");
        assert!(values.resolve(leaf, &missing).is_err());
    }

    #[test]
    fn test_nested_paths_and_context() {
        let types = nested();
        let (values, leaf) = bound(&types);
        let binding = BindingInfo::path("middle.size").ancestor(3);
        assert_eq!(values.resolve(leaf, &binding).unwrap(), Value::UInt(300));

        let binding = BindingInfo::context("mode");
        assert_eq!(values.resolve(leaf, &binding).unwrap(), Value::UInt(5));

        let missing = BindingInfo::path("nothing");
        assert!(matches!(
            values.resolve(leaf, &missing),
            Err(Error::BindingResolution { .. })
        ));
    }

    #[test]
    fn test_apply_writes_back_through_converter() {
        let types = nested();
        let (mut values, leaf) = bound(&types);
        let binding = BindingInfo::path("size")
            .ancestor(2)
            .with_converter(ScaleConverter::new(4));

        values.apply(leaf, &binding, Value::UInt(10)).unwrap();
        let raw = BindingInfo::path("size").ancestor(2);
        assert_eq!(values.resolve(leaf, &raw).unwrap(), Value::UInt(3));
        assert_eq!(values.resolve(leaf, &binding).unwrap(), Value::UInt(12));
    }

    #[test]
    fn test_apply_rejects_composites_and_context() {
        let types = nested();
        let (mut values, leaf) = bound(&types);
        let composite = BindingInfo::path("middle").ancestor(3);
        assert!(values.apply(leaf, &composite, Value::UInt(1)).is_err());
        assert!(values
            .apply(leaf, &BindingInfo::context("mode"), Value::UInt(1))
            .is_err());
    }

    #[test]
    fn test_previous_data_is_not_supported() {
        let types = nested();
        let (values, leaf) = bound(&types);
        assert!(matches!(
            values.resolve(leaf, &BindingInfo::previous_data("value")),
            Err(Error::NotSupported(_))
        ));
    }
}
