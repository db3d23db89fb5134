//! Value Graph - Per-Call Value Tree
//!
//! An arena of value nodes paired with the schema graph. Every node records
//! its parent so bindings can walk upwards by index. A node starts unbound;
//! binding it fixes its children (or its concrete type) for the rest of the
//! call, and binding it twice is a programming error.

use crate::error::{Error, Result};
use crate::graph::type_graph::{CollectionShape, LayoutId, NodeId, NodeKind, TypeGraph, TypeNode};
use crate::schema::value::{ObjectValue, Value};

/// Index of a node in a [`ValueGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub(crate) usize);

/// Binding state of a value node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeState {
    /// Not yet assigned or read; materializes as the field default
    Unbound,
    Scalar(Value),
    /// Composite with a fixed concrete layout, or absent when `layout` is `None`
    Object {
        layout: Option<LayoutId>,
        children: Vec<ValueId>,
    },
    Collection { items: Vec<ValueId> },
}

/// One field occurrence for one value
#[derive(Debug, Clone)]
pub struct ValueNode {
    pub schema: NodeId,
    pub parent: Option<ValueId>,
    pub depth: usize,
    pub state: NodeState,
}

/// Value tree owned by one serialize or deserialize call
#[derive(Debug)]
pub struct ValueGraph<'g> {
    types: &'g TypeGraph,
    nodes: Vec<ValueNode>,
    context: Option<Value>,
    max_depth: usize,
}

impl<'g> ValueGraph<'g> {
    /// Create an empty value graph
    pub fn new(types: &'g TypeGraph, context: Option<Value>, max_depth: usize) -> Self {
        Self {
            types,
            nodes: Vec::new(),
            context,
            max_depth,
        }
    }

    pub fn types(&self) -> &'g TypeGraph {
        self.types
    }

    /// Call-scoped context value
    pub fn context(&self) -> Option<&Value> {
        self.context.as_ref()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: ValueId) -> &ValueNode {
        &self.nodes[id.0]
    }

    /// Schema node of a value node
    pub fn schema(&self, id: ValueId) -> &'g TypeNode {
        self.types.node(self.nodes[id.0].schema)
    }

    /// Create the node for the root type
    pub fn add_root(&mut self) -> Result<ValueId> {
        self.add_node(self.types.root(), None)
    }

    fn add_node(&mut self, schema: NodeId, parent: Option<ValueId>) -> Result<ValueId> {
        let depth = parent.map_or(0, |p| self.nodes[p.0].depth + 1);
        if depth > self.max_depth {
            return Err(Error::DepthExceeded(self.max_depth));
        }
        self.nodes.push(ValueNode {
            schema,
            parent,
            depth,
            state: NodeState::Unbound,
        });
        Ok(ValueId(self.nodes.len() - 1))
    }

    fn assert_unbound(&self, id: ValueId) {
        assert!(
            self.nodes[id.0].state == NodeState::Unbound,
            "value node '{}' is already bound",
            self.schema(id).name
        );
    }

    // ------------------------------------------------------------------------
    // Binding
    // ------------------------------------------------------------------------

    /// Fix the concrete layout of an object node and create its children
    ///
    /// `None` marks the object absent.
    pub fn bind_object(&mut self, id: ValueId, layout: Option<LayoutId>) -> Result<Vec<ValueId>> {
        self.assert_unbound(id);
        let mut children = Vec::new();
        if let Some(layout) = layout {
            for field in &self.types.layout(layout).fields {
                children.push(self.add_node(*field, Some(id))?);
            }
        }
        self.nodes[id.0].state = NodeState::Object {
            layout,
            children: children.clone(),
        };
        Ok(children)
    }

    /// Mark a collection node as bound with no items
    pub fn begin_collection(&mut self, id: ValueId) {
        self.assert_unbound(id);
        self.nodes[id.0].state = NodeState::Collection { items: Vec::new() };
    }

    /// Append a new unbound item to a collection
    pub fn push_item(&mut self, id: ValueId) -> Result<ValueId> {
        let item_schema = match self.schema(id).kind {
            NodeKind::Collection { item, .. } => item,
            _ => {
                return Err(Error::InvalidData(format!(
                    "'{}' is not a collection",
                    self.schema(id).name
                )))
            }
        };
        if !matches!(self.nodes[id.0].state, NodeState::Collection { .. }) {
            return Err(Error::InvalidData(format!(
                "collection '{}' was not started",
                self.schema(id).name
            )));
        }
        let item = self.add_node(item_schema, Some(id))?;
        if let NodeState::Collection { items } = &mut self.nodes[id.0].state {
            items.push(item);
        }
        Ok(item)
    }

    /// Remove the last item of a collection
    pub fn pop_item(&mut self, id: ValueId) -> Option<ValueId> {
        match &mut self.nodes[id.0].state {
            NodeState::Collection { items } => items.pop(),
            _ => None,
        }
    }

    /// Set the value of a scalar node
    ///
    /// Scalars may be updated by two-way bindings; composites may not.
    pub fn set_scalar(&mut self, id: ValueId, value: Value) {
        let node = &mut self.nodes[id.0];
        assert!(
            matches!(node.state, NodeState::Unbound | NodeState::Scalar(_)),
            "composite value node cannot hold a scalar"
        );
        node.state = NodeState::Scalar(value);
    }

    /// Bind a node from a host value, fanning out to children
    pub fn assign(&mut self, id: ValueId, value: &Value) -> Result<()> {
        let schema = self.schema(id);
        match &schema.kind {
            NodeKind::Value => {
                self.set_scalar(id, value.clone());
                Ok(())
            }
            NodeKind::Object { declared } => match value {
                Value::Null => self.bind_object(id, None).map(|_| ()),
                Value::Object(object) => {
                    let layout = self.concrete_layout(*declared, object.type_name())?;
                    for child in self.bind_object(id, Some(layout))? {
                        let field = self.schema(child);
                        let member = field.accessor.get(object);
                        self.assign(child, &member)
                            .map_err(|e| e.serializing(field.name.as_str()))?;
                    }
                    Ok(())
                }
                other => Err(Error::InvalidData(format!(
                    "expected {} object, found {:?}",
                    schema.element_type, other
                ))),
            },
            NodeKind::Collection { item, shape } => {
                let items = self.collection_items(*item, *shape, value)?;
                self.begin_collection(id);
                for (index, item) in items.iter().enumerate() {
                    let item_id = self.push_item(id)?;
                    self.assign(item_id, item)
                        .map_err(|e| e.serializing(format!("[{}]", index)))?;
                }
                Ok(())
            }
        }
    }

    /// Host value split into collection items
    fn collection_items(
        &self,
        item: NodeId,
        shape: CollectionShape,
        value: &Value,
    ) -> Result<Vec<Value>> {
        match (shape, value) {
            (_, Value::Null) => Ok(Vec::new()),
            (CollectionShape::List, Value::List(items)) => Ok(items.clone()),
            (CollectionShape::List, Value::Bytes(bytes)) => {
                Ok(bytes.iter().map(|b| Value::UInt(u64::from(*b))).collect())
            }
            (CollectionShape::Map, Value::Map(entries)) => {
                let entry_type = self.types.node(item).element_type.to_string();
                Ok(entries
                    .iter()
                    .map(|(key, value)| {
                        Value::Object(
                            ObjectValue::new(entry_type.as_str())
                                .with("key", key.clone())
                                .with("value", value.clone()),
                        )
                    })
                    .collect())
            }
            (_, other) => Err(Error::InvalidData(format!(
                "expected a collection, found {:?}",
                other
            ))),
        }
    }

    /// Layout for a host object assigned to a field of a declared type
    fn concrete_layout(&self, declared: LayoutId, type_name: &str) -> Result<LayoutId> {
        let declared_name = &self.types.layout(declared).type_name;
        let layout = self
            .types
            .layout_by_name(type_name)
            .filter(|id| self.types.layout(*id).is_a(declared_name))
            .ok_or_else(|| {
                Error::InvalidData(format!(
                    "'{}' is not a known subtype of '{}'",
                    type_name, declared_name
                ))
            })?;
        if self.types.layout(layout).is_abstract {
            return Err(Error::InvalidData(format!(
                "cannot serialize abstract type '{}'",
                type_name
            )));
        }
        Ok(layout)
    }

    // ------------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------------

    /// Children of an object node (empty if unbound or absent)
    pub fn children(&self, id: ValueId) -> &[ValueId] {
        match &self.nodes[id.0].state {
            NodeState::Object { children, .. } => children,
            _ => &[],
        }
    }

    /// Items of a collection node (empty if unbound)
    pub fn items(&self, id: ValueId) -> &[ValueId] {
        match &self.nodes[id.0].state {
            NodeState::Collection { items } => items,
            _ => &[],
        }
    }

    /// Concrete layout of a bound, present object node
    pub fn layout_of(&self, id: ValueId) -> Option<LayoutId> {
        match &self.nodes[id.0].state {
            NodeState::Object { layout, .. } => *layout,
            _ => None,
        }
    }

    /// Concrete type name of an object node, falling back to its declared type
    pub fn type_name(&self, id: ValueId) -> String {
        match self.layout_of(id) {
            Some(layout) => self.types.layout(layout).type_name.clone(),
            None => self.schema(id).element_type.to_string(),
        }
    }

    /// Child of an object node by field name
    pub fn child_by_name(&self, id: ValueId, name: &str) -> Option<ValueId> {
        self.children(id)
            .iter()
            .copied()
            .find(|child| self.schema(*child).name == name)
    }

    // ------------------------------------------------------------------------
    // Materialization
    // ------------------------------------------------------------------------

    /// Current value of a node, built from its children when composite
    pub fn value(&self, id: ValueId) -> Value {
        let schema = self.schema(id);
        match &self.nodes[id.0].state {
            NodeState::Unbound => schema.default_value(),
            NodeState::Scalar(value) => value.clone(),
            NodeState::Object { layout: None, .. } => Value::Null,
            NodeState::Object {
                layout: Some(layout),
                children,
            } => {
                let mut object = ObjectValue::new(self.types.layout(*layout).type_name.as_str());
                for child in children {
                    let field = self.schema(*child);
                    if field.ignored {
                        continue;
                    }
                    field.accessor.set(&mut object, self.value(*child));
                }
                Value::Object(object)
            }
            NodeState::Collection { items } => match schema.kind {
                NodeKind::Collection {
                    shape: CollectionShape::Map,
                    ..
                } => Value::Map(
                    items
                        .iter()
                        .map(|entry| {
                            let member = |name| {
                                self.child_by_name(*entry, name)
                                    .map(|child| self.value(child))
                                    .unwrap_or_default()
                            };
                            (member("key"), member("value"))
                        })
                        .collect(),
                ),
                _ => Value::List(items.iter().map(|item| self.value(*item)).collect()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::descriptor::{FieldDescriptor, ObjectDescriptor, TypeRegistry};
    use crate::schema::types::ElementType;

    fn graph() -> TypeGraph {
        let mut registry = TypeRegistry::new();
        registry
            .register(
                ObjectDescriptor::new("Point")
                    .field(FieldDescriptor::new("x", ElementType::I32))
                    .field(FieldDescriptor::new("y", ElementType::I32)),
            )
            .unwrap();
        registry
            .register(
                ObjectDescriptor::new("Path")
                    .field(FieldDescriptor::new("name", ElementType::String))
                    .field(FieldDescriptor::new(
                        "points",
                        ElementType::list(ElementType::object("Point")),
                    )),
            )
            .unwrap();
        TypeGraph::build(&registry, "Path").unwrap()
    }

    fn path_value() -> Value {
        let point = |x: i32, y: i32| Value::from(ObjectValue::new("Point").with("x", x).with("y", y));
        Value::from(
            ObjectValue::new("Path")
                .with("name", "route")
                .with("points", vec![point(1, 2), point(3, 4)]),
        )
    }

    #[test]
    fn test_assign_then_materialize() {
        let types = graph();
        let mut values = ValueGraph::new(&types, None, 16);
        let root = values.add_root().unwrap();
        values.assign(root, &path_value()).unwrap();

        let points = values.child_by_name(root, "points").unwrap();
        assert_eq!(values.items(points).len(), 2);
        assert_eq!(values.node(points).parent, Some(root));
        assert_eq!(values.value(root), path_value());
    }

    #[test]
    fn test_unbound_children_materialize_as_defaults() {
        let types = graph();
        let mut values = ValueGraph::new(&types, None, 16);
        let root = values.add_root().unwrap();
        let layout = types.layout_by_name("Path");
        values.bind_object(root, layout).unwrap();

        let expected = ObjectValue::new("Path")
            .with("name", "")
            .with("points", Value::List(Vec::new()));
        assert_eq!(values.value(root), Value::Object(expected));
    }

    #[test]
    #[should_panic(expected = "already bound")]
    fn test_rebinding_panics() {
        let types = graph();
        let mut values = ValueGraph::new(&types, None, 16);
        let root = values.add_root().unwrap();
        let layout = types.layout_by_name("Path");
        values.bind_object(root, layout).unwrap();
        let _ = values.bind_object(root, layout);
    }

    #[test]
    fn test_depth_limit() {
        let types = graph();
        let mut values = ValueGraph::new(&types, None, 1);
        let root = values.add_root().unwrap();
        let err = values.assign(root, &path_value()).unwrap_err();
        assert!(matches!(err.root_cause(), Error::DepthExceeded(1)));
    }

    #[test]
    fn test_unknown_concrete_type_rejected() {
        let types = graph();
        let mut values = ValueGraph::new(&types, None, 16);
        let root = values.add_root().unwrap();
        let err = values
            .assign(root, &Value::from(ObjectValue::new("Point")))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }
}
