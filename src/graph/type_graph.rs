//! Type Graph - Immutable Schema Graph
//!
//! Built once per root type from the registered descriptors. Nodes and
//! object layouts live in arenas addressed by index; a layout is shared by
//! every field whose type resolves to it, so recursive types need no
//! ownership cycles.
//!
//! Construction validates the field metadata and precomputes the static
//! size of every node whose encoding does not depend on data.

use std::collections::HashMap;
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::schema::binding::{Binding, BindingInfo, Condition, ItemTermination};
use crate::schema::descriptor::{FieldAccessor, FieldAttribute, FieldDescriptor, TypeRegistry};
use crate::schema::types::{ElementType, Endian, SerializedType, TextEncoding};
use crate::schema::value::Value;

// ============================================================================
// Identifiers
// ============================================================================

/// Index of a node in a [`TypeGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Index of an object layout in a [`TypeGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayoutId(pub(crate) usize);

// ============================================================================
// Nodes
// ============================================================================

/// How a collection materializes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionShape {
    List,
    /// Items are key/value entry objects
    Map,
}

/// Structural variant of a node
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Scalar encoded by a [`SerializedType`]
    Value,
    /// Composite whose fields come from an object layout
    Object { declared: LayoutId },
    /// Sequence of nodes sharing one item schema
    Collection { item: NodeId, shape: CollectionShape },
}

/// Discriminant-to-layout table of a polymorphic field
#[derive(Debug, Clone)]
pub struct SubtypeTable {
    /// Source of the discriminant, shared by every case
    pub binding: BindingInfo,
    pub cases: Vec<(Value, LayoutId)>,
}

impl SubtypeTable {
    /// Layout selected by a discriminant, using type-coercing equality
    pub fn match_value(&self, discriminant: &Value) -> Option<LayoutId> {
        self.cases
            .iter()
            .find(|(value, _)| value.loosely_equals(discriminant))
            .map(|(_, layout)| *layout)
    }

    /// Discriminant written for a concrete layout
    pub fn discriminant_for(&self, layout: LayoutId) -> Option<&Value> {
        self.cases
            .iter()
            .find(|(_, candidate)| *candidate == layout)
            .map(|(value, _)| value)
    }
}

/// Sentinel that ends a collection
#[derive(Debug, Clone)]
pub struct Termination {
    pub value: Binding,
    /// Synthetic node typed after the sentinel
    pub node: NodeId,
}

/// One declared field, collection item or root type
#[derive(Debug, Clone)]
pub struct TypeNode {
    pub name: String,
    pub element_type: ElementType,
    /// Wire representation after defaults and promotion
    pub serialized_type: SerializedType,
    pub order: i32,
    pub endianness: Option<Endian>,
    pub encoding: Option<TextEncoding>,
    pub length: Option<Binding>,
    pub item_length: Option<Binding>,
    pub count: Option<Binding>,
    pub offset: Option<Binding>,
    pub conditions: Vec<Condition>,
    pub subtypes: Option<SubtypeTable>,
    pub termination: Option<Termination>,
    pub item_termination: Option<ItemTermination>,
    pub accessor: FieldAccessor,
    pub default: Option<Value>,
    pub ignored: bool,
    /// Encoded size when it does not depend on data
    pub fixed_size: Option<usize>,
    pub kind: NodeKind,
}

impl TypeNode {
    fn plain(name: &str, element_type: ElementType, kind: NodeKind) -> Self {
        Self {
            name: name.to_string(),
            serialized_type: element_type.default_serialized_type(),
            element_type,
            order: i32::MAX,
            endianness: None,
            encoding: None,
            length: None,
            item_length: None,
            count: None,
            offset: None,
            conditions: Vec::new(),
            subtypes: None,
            termination: None,
            item_termination: None,
            accessor: FieldAccessor::slot(name),
            default: None,
            ignored: false,
            fixed_size: None,
            kind,
        }
    }

    /// Value held when the field was never written or read
    pub fn default_value(&self) -> Value {
        self.default
            .clone()
            .unwrap_or_else(|| self.element_type.default_value())
    }
}

/// Ordered fields of one concrete object type
#[derive(Debug, Clone)]
pub struct ObjectLayout {
    pub type_name: String,
    /// The type followed by its bases
    pub lineage: Vec<String>,
    pub is_abstract: bool,
    /// Fields sorted by order, ties by declaration
    pub fields: Vec<NodeId>,
    pub fixed_size: Option<usize>,
}

impl ObjectLayout {
    /// True if this layout is `type_name` or derives from it
    pub fn is_a(&self, type_name: &str) -> bool {
        self.lineage.iter().any(|name| name == type_name)
    }
}

// ============================================================================
// Type Graph
// ============================================================================

/// Immutable schema graph for one root type
#[derive(Debug)]
pub struct TypeGraph {
    nodes: Vec<TypeNode>,
    layouts: Vec<ObjectLayout>,
    by_name: HashMap<String, LayoutId>,
    root: NodeId,
}

impl TypeGraph {
    /// Build and validate the graph rooted at a registered type
    pub fn build(registry: &TypeRegistry, root_type: &str) -> Result<Self> {
        let mut builder = GraphBuilder {
            registry,
            nodes: Vec::new(),
            layouts: Vec::new(),
            by_name: HashMap::new(),
        };
        let root = builder.build_element(root_type, &ElementType::object(root_type), false)?;
        builder.compute_fixed_sizes();

        debug!(
            "Built type graph for {}: {} nodes, {} layouts",
            root_type,
            builder.nodes.len(),
            builder.layouts.len()
        );

        Ok(Self {
            nodes: builder.nodes,
            layouts: builder.layouts,
            by_name: builder.by_name,
            root,
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &TypeNode {
        &self.nodes[id.0]
    }

    pub fn layout(&self, id: LayoutId) -> &ObjectLayout {
        &self.layouts[id.0]
    }

    /// Layout of a concrete type reachable from the root
    pub fn layout_by_name(&self, type_name: &str) -> Option<LayoutId> {
        self.by_name.get(type_name).copied()
    }

    /// Static size of the root type, if known
    pub fn fixed_size(&self) -> Option<usize> {
        self.node(self.root).fixed_size
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

// ============================================================================
// Construction
// ============================================================================

struct GraphBuilder<'r> {
    registry: &'r TypeRegistry,
    nodes: Vec<TypeNode>,
    layouts: Vec<ObjectLayout>,
    by_name: HashMap<String, LayoutId>,
}

#[derive(Clone, Copy)]
enum SizeState {
    Pending,
    InProgress,
    Done(Option<usize>),
}

impl<'r> GraphBuilder<'r> {
    fn push(&mut self, node: TypeNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Layout for a registered type, built on first use
    fn build_layout(&mut self, type_name: &str) -> Result<LayoutId> {
        if let Some(id) = self.by_name.get(type_name) {
            return Ok(*id);
        }

        let registry = self.registry;
        let descriptor = registry
            .get(type_name)
            .ok_or_else(|| SchemaError::UnknownType(type_name.to_string()))?;
        let lineage = registry
            .lineage(type_name)?
            .iter()
            .map(|d| d.type_name.clone())
            .collect();

        let id = LayoutId(self.layouts.len());
        self.layouts.push(ObjectLayout {
            type_name: type_name.to_string(),
            lineage,
            is_abstract: descriptor.is_abstract,
            fields: Vec::new(),
            fixed_size: None,
        });
        self.by_name.insert(type_name.to_string(), id);

        let mut fields = Vec::new();
        for (index, field) in registry.all_fields(type_name)?.into_iter().enumerate() {
            fields.push((self.build_field(field)?, index));
        }
        fields.sort_by_key(|(node, index)| (self.nodes[node.0].order, *index));
        self.layouts[id.0].fields = fields.into_iter().map(|(node, _)| node).collect();
        Ok(id)
    }

    /// Layout for a key/value entry of a map
    fn build_entry_layout(&mut self, key: &ElementType, value: &ElementType) -> Result<LayoutId> {
        let type_name = ElementType::map(key.clone(), value.clone()).to_string();
        if let Some(id) = self.by_name.get(&type_name) {
            return Ok(*id);
        }

        let id = LayoutId(self.layouts.len());
        self.layouts.push(ObjectLayout {
            type_name: type_name.clone(),
            lineage: vec![type_name.clone()],
            is_abstract: false,
            fields: Vec::new(),
            fixed_size: None,
        });
        self.by_name.insert(type_name, id);

        let key_node = self.build_element("key", key, false)?;
        let value_node = self.build_element("value", value, false)?;
        self.layouts[id.0].fields = vec![key_node, value_node];
        Ok(id)
    }

    /// Structural kind of an element type, building referenced layouts
    fn kind_for(&mut self, element: &ElementType, sized_items: bool) -> Result<NodeKind> {
        Ok(match element {
            ElementType::Object(type_name) => {
                let declared = self.build_layout(type_name)?;
                let registry = self.registry;
                for derived in registry.derived_types(type_name) {
                    self.build_layout(derived)?;
                }
                NodeKind::Object { declared }
            }
            ElementType::List(inner) => NodeKind::Collection {
                item: self.build_element("item", inner, sized_items)?,
                shape: CollectionShape::List,
            },
            ElementType::Map(key, value) => {
                let entry = self.build_entry_layout(key, value)?;
                let node = TypeNode::plain(
                    "item",
                    ElementType::object(self.layouts[entry.0].type_name.clone()),
                    NodeKind::Object { declared: entry },
                );
                NodeKind::Collection {
                    item: self.push(node),
                    shape: CollectionShape::Map,
                }
            }
            _ => NodeKind::Value,
        })
    }

    /// Node without field attributes: roots, items, map keys and values, sentinels
    fn build_element(&mut self, name: &str, element: &ElementType, sized: bool) -> Result<NodeId> {
        let kind = self.kind_for(element, false)?;
        let mut node = TypeNode::plain(name, element.clone(), kind);
        if sized && node.serialized_type == SerializedType::NullTerminatedString {
            node.serialized_type = SerializedType::SizedString;
        }
        Ok(self.push(node))
    }

    fn build_field(&mut self, field: &FieldDescriptor) -> Result<NodeId> {
        check_attributes(field)?;

        let element = &field.element_type;
        let has_item_length = field
            .attributes
            .iter()
            .any(|a| matches!(a, FieldAttribute::ItemLength(_)));
        let kind = self.kind_for(element, has_item_length)?;

        let mut node = TypeNode::plain(&field.name, element.clone(), kind);
        node.accessor = field.accessor.clone();
        node.default = field.default.clone();

        let mut explicit = None;
        let mut subtypes = Vec::new();
        for attribute in &field.attributes {
            match attribute {
                FieldAttribute::Order(order) => node.order = *order,
                FieldAttribute::SerializeAs(serialized) => explicit = Some(*serialized),
                FieldAttribute::Endianness(endian) => node.endianness = Some(*endian),
                FieldAttribute::Encoding(encoding) => node.encoding = Some(*encoding),
                FieldAttribute::FieldLength(length) => node.length = Some(length.clone()),
                FieldAttribute::ItemLength(length) => node.item_length = Some(length.clone()),
                FieldAttribute::FieldCount(count) => {
                    // Counts on text and raw bytes are byte lengths
                    if matches!(element, ElementType::String | ElementType::Bytes) {
                        node.length = Some(count.clone());
                    } else {
                        node.count = Some(count.clone());
                    }
                }
                FieldAttribute::FieldOffset(offset) => node.offset = Some(offset.clone()),
                FieldAttribute::Subtype {
                    binding,
                    value,
                    subtype,
                } => subtypes.push((binding, value, subtype.as_str())),
                FieldAttribute::SerializeWhen(condition) => node.conditions.push(condition.clone()),
                FieldAttribute::SerializeUntil { value, element: declared } => {
                    let name = format!("{} terminator", field.name);
                    let sentinel_type = sentinel_type(element, value, declared.as_ref());
                    let sentinel = self.build_element(&name, &sentinel_type, false)?;
                    node.termination = Some(Termination {
                        value: value.clone(),
                        node: sentinel,
                    });
                }
                FieldAttribute::ItemSerializeUntil(termination) => {
                    node.item_termination = Some(termination.clone())
                }
                FieldAttribute::Ignore => node.ignored = true,
            }
        }

        node.serialized_type = explicit.unwrap_or_else(|| element.default_serialized_type());
        if node.serialized_type == SerializedType::NullTerminatedString && node.length.is_some() {
            node.serialized_type = SerializedType::SizedString;
        }

        if let (ElementType::Object(declared), false) = (element, subtypes.is_empty()) {
            node.subtypes = Some(self.build_subtypes(field, declared, subtypes)?);
        }

        Ok(self.push(node))
    }

    fn build_subtypes(
        &mut self,
        field: &FieldDescriptor,
        declared: &str,
        entries: Vec<(&BindingInfo, &Value, &str)>,
    ) -> Result<SubtypeTable> {
        let binding = entries[0].0.clone();
        let mut cases: Vec<(Value, LayoutId)> = Vec::new();
        let mut seen_types: Vec<&str> = Vec::new();

        for (entry_binding, value, subtype) in entries {
            if !entry_binding.same_source(&binding) {
                return Err(SchemaError::SubtypeBindingMismatch {
                    field: field.name.clone(),
                }
                .into());
            }
            if cases.iter().any(|(existing, _)| existing.loosely_equals(value)) {
                return Err(SchemaError::DuplicateSubtypeValue {
                    field: field.name.clone(),
                    value: format!("{:?}", value),
                }
                .into());
            }
            if binding.is_two_way() && seen_types.contains(&subtype) {
                return Err(SchemaError::DuplicateSubtype {
                    field: field.name.clone(),
                    subtype: subtype.to_string(),
                }
                .into());
            }
            if !self.registry.contains(subtype) {
                return Err(SchemaError::UnknownType(subtype.to_string()).into());
            }
            if !self.registry.is_derived_from(subtype, declared) {
                return Err(SchemaError::InvalidSubtype {
                    field: field.name.clone(),
                    subtype: subtype.to_string(),
                    declared: declared.to_string(),
                }
                .into());
            }

            seen_types.push(subtype);
            cases.push((value.clone(), self.build_layout(subtype)?));
        }

        Ok(SubtypeTable { binding, cases })
    }

    // ------------------------------------------------------------------------
    // Static sizes
    // ------------------------------------------------------------------------

    fn compute_fixed_sizes(&mut self) {
        let mut memo = vec![SizeState::Pending; self.layouts.len()];
        let sizes: Vec<Option<usize>> = (0..self.nodes.len())
            .map(|index| self.node_size(NodeId(index), &mut memo))
            .collect();
        for (node, size) in self.nodes.iter_mut().zip(sizes) {
            node.fixed_size = size;
        }
        for index in 0..self.layouts.len() {
            self.layouts[index].fixed_size = self.layout_size(LayoutId(index), &mut memo);
        }
    }

    fn node_size(&self, id: NodeId, memo: &mut [SizeState]) -> Option<usize> {
        let node = &self.nodes[id.0];
        if node.ignored || node.offset.is_some() {
            return Some(0);
        }
        if !node.conditions.is_empty() {
            return None;
        }
        if let Some(length) = &node.length {
            return length.as_const().and_then(|v| v.as_usize().ok());
        }

        match &node.kind {
            NodeKind::Value => node.serialized_type.fixed_size(),
            NodeKind::Object { declared } => {
                if node.subtypes.is_some() {
                    None
                } else {
                    self.layout_size(*declared, memo)
                }
            }
            NodeKind::Collection { item, .. } => {
                if node.termination.is_some() || node.item_termination.is_some() {
                    return None;
                }
                let count = node.count.as_ref()?.as_const()?.as_usize().ok()?;
                let item_size = match &node.item_length {
                    Some(length) => length.as_const()?.as_usize().ok()?,
                    None => self.node_size(*item, memo)?,
                };
                count.checked_mul(item_size)
            }
        }
    }

    fn layout_size(&self, id: LayoutId, memo: &mut [SizeState]) -> Option<usize> {
        match memo[id.0] {
            SizeState::Done(size) => return size,
            // Recursive layouts are variable
            SizeState::InProgress => return None,
            SizeState::Pending => {}
        }

        memo[id.0] = SizeState::InProgress;
        let layout = &self.layouts[id.0];
        let size = if layout.is_abstract {
            None
        } else {
            layout
                .fields
                .iter()
                .try_fold(0usize, |total, field| {
                    total.checked_add(self.node_size(*field, memo)?)
                })
        };
        memo[id.0] = SizeState::Done(size);
        size
    }
}

// ============================================================================
// Attribute Validation
// ============================================================================

fn check_attributes(field: &FieldDescriptor) -> Result<()> {
    let element = &field.element_type;
    let name = || field.name.clone();
    let mut seen: Vec<&'static str> = Vec::new();

    for attribute in &field.attributes {
        let kind = attribute.kind_name();
        if attribute.is_exclusive() && seen.contains(&kind) {
            return Err(SchemaError::DuplicateAttribute {
                field: name(),
                attribute: kind,
            }
            .into());
        }
        seen.push(kind);

        let applies = match attribute {
            FieldAttribute::ItemLength(_)
            | FieldAttribute::SerializeUntil { .. }
            | FieldAttribute::ItemSerializeUntil(_) => element.is_collection(),
            FieldAttribute::FieldCount(_) => {
                element.is_collection() || matches!(element, ElementType::String | ElementType::Bytes)
            }
            FieldAttribute::Subtype { .. } => matches!(element, ElementType::Object(_)),
            _ => true,
        };
        if !applies {
            return Err(SchemaError::InvalidAttribute {
                field: name(),
                attribute: kind,
                element: element.to_string(),
            }
            .into());
        }

        match attribute {
            FieldAttribute::SerializeAs(serialized) if !element.accepts(*serialized) => {
                return Err(SchemaError::IncompatibleSerializedType {
                    field: name(),
                    element: element.to_string(),
                    serialized: serialized.to_string(),
                }
                .into());
            }
            FieldAttribute::SerializeUntil {
                element: Some(sentinel),
                ..
            } if sentinel.is_collection() || matches!(sentinel, ElementType::Object(_)) =>
            {
                return Err(SchemaError::InvalidAttribute {
                    field: name(),
                    attribute: kind,
                    element: sentinel.to_string(),
                }
                .into());
            }
            _ => {}
        }

        for binding in attribute_bindings(attribute) {
            binding.validate()?;
        }
    }

    let policies: Vec<&'static str> = ["field-count", "serialize-until", "item-serialize-until"]
        .into_iter()
        .filter(|policy| seen.contains(policy))
        .collect();
    if policies.len() > 1 {
        return Err(SchemaError::ConflictingAttributes {
            field: name(),
            first: policies[0],
            second: policies[1],
        }
        .into());
    }

    if matches!(element, ElementType::String | ElementType::Bytes)
        && seen.contains(&"field-length")
        && seen.contains(&"field-count")
    {
        return Err(SchemaError::ConflictingAttributes {
            field: name(),
            first: "field-length",
            second: "field-count",
        }
        .into());
    }

    Ok(())
}

/// Element type of a collection's sentinel
///
/// An explicit type wins. Otherwise numeric items lend their type when the
/// constant fits it, and the constant's own narrowest type is used last.
fn sentinel_type(
    collection: &ElementType,
    value: &Binding,
    declared: Option<&ElementType>,
) -> ElementType {
    if let Some(declared) = declared {
        return declared.clone();
    }
    let constant = value.as_const().cloned().unwrap_or(Value::UInt(0));
    match collection {
        ElementType::List(item)
            if item.is_scalar_number() && constant.coerce_to(item).is_ok() =>
        {
            item.as_ref().clone()
        }
        _ => ElementType::for_value(&constant),
    }
}

/// Bound sources referenced by an attribute
fn attribute_bindings(attribute: &FieldAttribute) -> Vec<&BindingInfo> {
    match attribute {
        FieldAttribute::FieldLength(b)
        | FieldAttribute::ItemLength(b)
        | FieldAttribute::FieldCount(b)
        | FieldAttribute::FieldOffset(b)
        | FieldAttribute::SerializeUntil { value: b, .. } => b.as_bound().into_iter().collect(),
        FieldAttribute::ItemSerializeUntil(termination) => {
            termination.value.as_bound().into_iter().collect()
        }
        FieldAttribute::Subtype { binding, .. } => vec![binding],
        FieldAttribute::SerializeWhen(condition) => vec![&condition.binding],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::schema::binding::LastItemMode;
    use crate::schema::descriptor::ObjectDescriptor;

    fn registry_with(descriptors: Vec<ObjectDescriptor>) -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        for descriptor in descriptors {
            registry.register(descriptor).unwrap();
        }
        registry
    }

    fn schema_error(result: Result<TypeGraph>) -> SchemaError {
        match result {
            Err(Error::Schema(err)) => err,
            other => panic!("expected schema error, got {:?}", other.map(|g| g.node_count())),
        }
    }

    #[test]
    fn test_fields_sorted_by_order_then_declaration() {
        let registry = registry_with(vec![ObjectDescriptor::new("Packet")
            .field(FieldDescriptor::new("c", ElementType::U8))
            .field(FieldDescriptor::new("b", ElementType::U8).with_order(2))
            .field(FieldDescriptor::new("a", ElementType::U8).with_order(1))
            .field(FieldDescriptor::new("d", ElementType::U8))]);
        let graph = TypeGraph::build(&registry, "Packet").unwrap();
        let layout = graph.layout(graph.layout_by_name("Packet").unwrap());
        let names: Vec<&str> = layout.fields.iter().map(|id| graph.node(*id).name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_fixed_sizes() {
        let registry = registry_with(vec![
            ObjectDescriptor::new("Header")
                .field(FieldDescriptor::new("magic", ElementType::U32))
                .field(FieldDescriptor::new("flags", ElementType::U16)),
            ObjectDescriptor::new("Frame")
                .field(FieldDescriptor::new("header", ElementType::object("Header")))
                .field(FieldDescriptor::new("name", ElementType::String).with_length(8usize))
                .field(
                    FieldDescriptor::new("samples", ElementType::list(ElementType::I16))
                        .with_count(4usize),
                ),
        ]);
        let graph = TypeGraph::build(&registry, "Frame").unwrap();
        assert_eq!(graph.fixed_size(), Some(6 + 8 + 8));
    }

    #[test]
    fn test_variable_parts_have_no_fixed_size() {
        let registry = registry_with(vec![ObjectDescriptor::new("Message")
            .field(FieldDescriptor::new("text", ElementType::String))
            .field(FieldDescriptor::new("len", ElementType::U8))
            .field(
                FieldDescriptor::new("data", ElementType::Bytes)
                    .with_length(BindingInfo::path("len")),
            )]);
        let graph = TypeGraph::build(&registry, "Message").unwrap();
        let layout = graph.layout(graph.layout_by_name("Message").unwrap());
        let sizes: Vec<Option<usize>> =
            layout.fields.iter().map(|id| graph.node(*id).fixed_size).collect();
        assert_eq!(sizes, vec![None, Some(1), None]);
        assert_eq!(graph.fixed_size(), None);
    }

    #[test]
    fn test_string_promotion() {
        let registry = registry_with(vec![ObjectDescriptor::new("Names")
            .field(FieldDescriptor::new("fixed", ElementType::String).with_length(4usize))
            .field(FieldDescriptor::new("plain", ElementType::String))
            .field(
                FieldDescriptor::new("list", ElementType::list(ElementType::String))
                    .with_item_length(3usize),
            )]);
        let graph = TypeGraph::build(&registry, "Names").unwrap();
        let layout = graph.layout(graph.layout_by_name("Names").unwrap());
        let fixed = graph.node(layout.fields[0]);
        let plain = graph.node(layout.fields[1]);
        assert_eq!(fixed.serialized_type, SerializedType::SizedString);
        assert_eq!(plain.serialized_type, SerializedType::NullTerminatedString);
        match graph.node(layout.fields[2]).kind {
            NodeKind::Collection { item, .. } => {
                assert_eq!(graph.node(item).serialized_type, SerializedType::SizedString)
            }
            ref other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_recursive_type_shares_layout() {
        let registry = registry_with(vec![ObjectDescriptor::new("Node")
            .field(FieldDescriptor::new("value", ElementType::U8))
            .field(
                FieldDescriptor::new("children", ElementType::list(ElementType::object("Node")))
                    .with_count(BindingInfo::path("count")),
            )
            .field(FieldDescriptor::new("count", ElementType::U8))]);
        let graph = TypeGraph::build(&registry, "Node").unwrap();
        assert!(graph.layout_by_name("Node").is_some());
        assert_eq!(graph.fixed_size(), None);
    }

    #[test]
    fn test_duplicate_exclusive_attribute() {
        let registry = registry_with(vec![ObjectDescriptor::new("T").field(
            FieldDescriptor::new("s", ElementType::String)
                .with_length(2usize)
                .with_length(3usize),
        )]);
        assert_eq!(
            schema_error(TypeGraph::build(&registry, "T")),
            SchemaError::DuplicateAttribute {
                field: "s".into(),
                attribute: "field-length"
            }
        );
    }

    #[test]
    fn test_sentinel_types() {
        let registry = registry_with(vec![ObjectDescriptor::new("Lists")
            .field(FieldDescriptor::new("wide", ElementType::list(ElementType::U16)).terminated())
            .field(FieldDescriptor::new("signed", ElementType::list(ElementType::U8)).until(-1i8))
            .field(FieldDescriptor::new("names", ElementType::list(ElementType::String)).terminated())
            .field(
                FieldDescriptor::new("typed", ElementType::list(ElementType::U8))
                    .until_typed(Value::UInt(0), ElementType::U32),
            )]);
        let graph = TypeGraph::build(&registry, "Lists").unwrap();
        let layout = graph.layout(graph.layout_by_name("Lists").unwrap());
        let sentinels: Vec<ElementType> = layout
            .fields
            .iter()
            .map(|id| {
                let termination = graph.node(*id).termination.as_ref().unwrap();
                graph.node(termination.node).element_type.clone()
            })
            .collect();
        assert_eq!(
            sentinels,
            vec![ElementType::U16, ElementType::I8, ElementType::U8, ElementType::U32]
        );
    }

    #[test]
    fn test_conflicting_termination_policies() {
        let registry = registry_with(vec![ObjectDescriptor::new("T").field(
            FieldDescriptor::new("items", ElementType::list(ElementType::U8))
                .with_count(2usize)
                .terminated(),
        )]);
        assert!(matches!(
            schema_error(TypeGraph::build(&registry, "T")),
            SchemaError::ConflictingAttributes {
                first: "field-count",
                second: "serialize-until",
                ..
            }
        ));

        let registry = registry_with(vec![ObjectDescriptor::new("T").field(
            FieldDescriptor::new("items", ElementType::list(ElementType::U8))
                .terminated()
                .item_until("", Value::UInt(9), LastItemMode::Include),
        )]);
        assert!(matches!(
            schema_error(TypeGraph::build(&registry, "T")),
            SchemaError::ConflictingAttributes { .. }
        ));
    }

    fn shapes(subtype_field: FieldDescriptor) -> TypeRegistry {
        registry_with(vec![
            ObjectDescriptor::new("Shape").abstract_type(),
            ObjectDescriptor::new("Circle")
                .extends("Shape")
                .field(FieldDescriptor::new("r", ElementType::U8)),
            ObjectDescriptor::new("Square")
                .extends("Shape")
                .field(FieldDescriptor::new("s", ElementType::U8)),
            ObjectDescriptor::new("Other"),
            ObjectDescriptor::new("Drawing")
                .field(FieldDescriptor::new("kind", ElementType::U8))
                .field(subtype_field),
        ])
    }

    #[test]
    fn test_subtype_table_validation() {
        let kind = || BindingInfo::path("kind");
        let field = || FieldDescriptor::new("shape", ElementType::object("Shape"));

        let mismatch = field()
            .with_subtype(kind(), 1u8, "Circle")
            .with_subtype(BindingInfo::path("other"), 2u8, "Square");
        assert!(matches!(
            schema_error(TypeGraph::build(&shapes(mismatch), "Drawing")),
            SchemaError::SubtypeBindingMismatch { .. }
        ));

        let collision = field()
            .with_subtype(kind(), 1u8, "Circle")
            .with_subtype(kind(), 1i32, "Square");
        assert!(matches!(
            schema_error(TypeGraph::build(&shapes(collision), "Drawing")),
            SchemaError::DuplicateSubtypeValue { .. }
        ));

        let repeated = field()
            .with_subtype(kind(), 1u8, "Circle")
            .with_subtype(kind(), 2u8, "Circle");
        assert!(matches!(
            schema_error(TypeGraph::build(&shapes(repeated), "Drawing")),
            SchemaError::DuplicateSubtype { .. }
        ));

        let one_way_repeat = field()
            .with_subtype(kind().one_way(), 1u8, "Circle")
            .with_subtype(kind().one_way(), 2u8, "Circle");
        assert!(TypeGraph::build(&shapes(one_way_repeat), "Drawing").is_ok());

        let unrelated = field().with_subtype(kind(), 1u8, "Other");
        assert!(matches!(
            schema_error(TypeGraph::build(&shapes(unrelated), "Drawing")),
            SchemaError::InvalidSubtype { .. }
        ));
    }

    #[test]
    fn test_attribute_kind_checks() {
        let registry = registry_with(vec![ObjectDescriptor::new("T")
            .field(FieldDescriptor::new("n", ElementType::U8).with_item_length(2usize))]);
        assert!(matches!(
            schema_error(TypeGraph::build(&registry, "T")),
            SchemaError::InvalidAttribute {
                attribute: "item-length",
                ..
            }
        ));

        let registry = registry_with(vec![ObjectDescriptor::new("T").field(
            FieldDescriptor::new("s", ElementType::String).serialize_as(SerializedType::UInt4),
        )]);
        assert!(matches!(
            schema_error(TypeGraph::build(&registry, "T")),
            SchemaError::IncompatibleSerializedType { .. }
        ));
    }

    #[test]
    fn test_unknown_type() {
        let registry = registry_with(vec![ObjectDescriptor::new("T")
            .field(FieldDescriptor::new("x", ElementType::list(ElementType::object("Missing"))))]);
        assert_eq!(
            schema_error(TypeGraph::build(&registry, "T")),
            SchemaError::UnknownType("Missing".into())
        );
    }

    #[test]
    fn test_binding_modes_checked_at_build() {
        let registry = registry_with(vec![ObjectDescriptor::new("T")
            .field(FieldDescriptor::new("len", ElementType::U8))
            .field(
                FieldDescriptor::new("data", ElementType::Bytes)
                    .with_length(BindingInfo::previous_data("len")),
            )]);
        assert!(matches!(
            TypeGraph::build(&registry, "T"),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn test_map_entries() {
        let registry = registry_with(vec![ObjectDescriptor::new("T").field(
            FieldDescriptor::new("m", ElementType::map(ElementType::U8, ElementType::U16))
                .with_count(2usize),
        )]);
        let graph = TypeGraph::build(&registry, "T").unwrap();
        assert!(graph.layout_by_name("map<u8, u16>").is_some());
        assert_eq!(graph.fixed_size(), Some(6));
    }
}
