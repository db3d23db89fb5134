//! Serialization walk
//!
//! Writes a bound value graph in field order. Before a node is written,
//! every two-way binding that targets it is re-evaluated: the bound
//! field is measured (or counted, or its subtype looked up) and the result
//! written back into this node. A length prefix therefore always matches
//! the payload that follows it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graph::resolver::Source;
use crate::graph::type_graph::NodeKind;
use crate::graph::value_graph::{NodeState, ValueGraph, ValueId};
use crate::graph::Scope;
use crate::observer::{notify, Phase, SerializationObserver};
use crate::schema::binding::{Binding, BindingInfo};
use crate::schema::value::Value;
use crate::stream::primitive::write_value;
use crate::stream::writer::BoundedWriter;

/// What a two-way binding derives from its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) enum TargetKind {
    Length,
    Count,
    ItemLength,
    Subtype,
}

#[derive(Debug, Clone)]
struct TwoWayTarget {
    target: ValueId,
    binding: BindingInfo,
    kind: TargetKind,
}

/// Writes one value graph to a stream
pub struct GraphSerializer<'a, 'g> {
    pub(super) values: &'a mut ValueGraph<'g>,
    observers: &'a [Arc<dyn SerializationObserver>],
    defaults: Scope,
    /// Source node -> bound fields that update it
    two_way: HashMap<ValueId, Vec<TwoWayTarget>>,
    /// Nodes currently being measured
    measuring: Vec<ValueId>,
    /// Bounds derived for two-way lengths, as the reader will see them
    bounds: HashMap<(ValueId, TargetKind), usize>,
}

impl<'a, 'g> GraphSerializer<'a, 'g> {
    pub fn new(
        values: &'a mut ValueGraph<'g>,
        observers: &'a [Arc<dyn SerializationObserver>],
        defaults: Scope,
    ) -> Self {
        Self {
            values,
            observers,
            defaults,
            two_way: HashMap::new(),
            measuring: Vec::new(),
            bounds: HashMap::new(),
        }
    }

    /// Register the sources of every two-way binding in the graph
    pub fn bind(&mut self) -> Result<()> {
        self.bind_from(0)
    }

    /// Register two-way bindings of nodes added from `first` on
    pub(super) fn bind_from(&mut self, first: usize) -> Result<()> {
        for index in first..self.values.len() {
            let id = ValueId(index);
            let schema = self.values.schema(id);

            let mut targets: Vec<(&BindingInfo, TargetKind)> = Vec::new();
            let bound = |binding: &'g Option<Binding>| {
                binding
                    .as_ref()
                    .and_then(Binding::as_bound)
                    .filter(|info| info.is_two_way())
            };
            if let Some(info) = bound(&schema.length) {
                targets.push((info, TargetKind::Length));
            }
            if let Some(info) = bound(&schema.count) {
                targets.push((info, TargetKind::Count));
            }
            if let Some(info) = bound(&schema.item_length) {
                targets.push((info, TargetKind::ItemLength));
            }
            if let Some(table) = &schema.subtypes {
                if table.binding.is_two_way() && self.values.layout_of(id).is_some() {
                    targets.push((&table.binding, TargetKind::Subtype));
                }
            }

            for (info, kind) in targets {
                let source = self
                    .values
                    .locate(id, info)
                    .map_err(|e| e.serializing(schema.name.as_str()))?;
                if let Source::Node(source) = source {
                    self.two_way.entry(source).or_default().push(TwoWayTarget {
                        target: id,
                        binding: info.clone(),
                        kind,
                    });
                }
            }
        }
        Ok(())
    }

    /// Serialize the graph starting at `root`
    pub fn write(&mut self, root: ValueId, writer: &mut BoundedWriter) -> Result<()> {
        let scope = self.defaults;
        self.serialize_node(root, writer, scope)
    }

    pub(super) fn serialize_node(
        &mut self,
        id: ValueId,
        writer: &mut BoundedWriter,
        scope: Scope,
    ) -> Result<()> {
        if !self.values.is_present(id)? {
            return Ok(());
        }
        let schema = self.values.schema(id);
        let scope = scope.enter(schema);
        self.update_from_targets(id)?;

        match &schema.offset {
            Some(offset) => {
                let position = self.values.resolve_usize(id, offset)?;
                writer.with_offset(position, |w| self.serialize_bounded(id, w, scope))
            }
            None => self.serialize_bounded(id, writer, scope),
        }
    }

    fn serialize_bounded(
        &mut self,
        id: ValueId,
        writer: &mut BoundedWriter,
        scope: Scope,
    ) -> Result<()> {
        let len = match &self.values.schema(id).length {
            Some(Binding::Bound(info)) if info.is_two_way() => {
                self.two_way_bound(id, info, TargetKind::Length)?
            }
            Some(length) => self.values.resolve_usize(id, length)?,
            None => return self.serialize_content(id, writer, scope),
        };
        writer.with_limit(len, |w| {
            self.serialize_content(id, w, scope)?;
            w.pad_to_limit()
        })
    }

    fn serialize_content(
        &mut self,
        id: ValueId,
        writer: &mut BoundedWriter,
        scope: Scope,
    ) -> Result<()> {
        let schema = self.values.schema(id);
        match &schema.kind {
            NodeKind::Value => {
                let default;
                let value = match &self.values.node(id).state {
                    NodeState::Scalar(value) => value,
                    _ => {
                        default = schema.default_value();
                        &default
                    }
                };
                write_value(
                    writer,
                    &schema.element_type,
                    schema.serialized_type,
                    value,
                    scope.endian,
                    scope.encoding,
                )
            }
            NodeKind::Object { .. } => self.serialize_object(id, writer, scope),
            NodeKind::Collection { item, .. } => {
                self.serialize_collection(id, *item, writer, scope)
            }
        }
    }

    fn serialize_object(
        &mut self,
        id: ValueId,
        writer: &mut BoundedWriter,
        scope: Scope,
    ) -> Result<()> {
        let children = self.values.children(id).to_vec();
        for child in children {
            let name = self.values.schema(child).name.as_str();
            self.notify(Phase::Serializing, id, child, writer.position())?;
            self.serialize_node(child, writer, scope)
                .map_err(|e| e.serializing(name))?;
            self.notify(Phase::Serialized, id, child, writer.position())?;
        }
        Ok(())
    }

    fn notify(&self, phase: Phase, object: ValueId, member: ValueId, offset: usize) -> Result<()> {
        if !self.measuring.is_empty() {
            return Ok(());
        }
        notify(self.observers, &*self.values, phase, object, member, offset)
    }

    // ------------------------------------------------------------------------
    // Two-way bindings
    // ------------------------------------------------------------------------

    /// Recompute `source` from the fields bound to it
    fn update_from_targets(&mut self, source: ValueId) -> Result<()> {
        let Some(targets) = self.two_way.get(&source).cloned() else {
            return Ok(());
        };

        for target in targets {
            if !self.values.is_present(target.target)? {
                continue;
            }
            let value = match target.kind {
                TargetKind::Length => {
                    let measured = self.measure(target.target)?;
                    self.record_bound(&target, measured)?
                }
                TargetKind::Count => Value::UInt(self.values.items(target.target).len() as u64),
                TargetKind::ItemLength => {
                    let measured = self.max_item_length(target.target)?;
                    self.record_bound(&target, measured)?
                }
                TargetKind::Subtype => match self.discriminant(target.target)? {
                    Some(value) => value,
                    None => continue,
                },
            };
            self.values.apply(target.target, &target.binding, value)?;
        }
        Ok(())
    }

    /// Remember the bound a measured length reads back as
    ///
    /// A converter may round on the way back (bytes to words), so the reader
    /// sees `convert(convert_back(measured))`, which can exceed `measured`.
    fn record_bound(&mut self, target: &TwoWayTarget, measured: usize) -> Result<Value> {
        let measured = Value::UInt(measured as u64);
        let bound = round_trip(&target.binding, &measured)?;
        self.bounds.insert((target.target, target.kind), bound);
        Ok(measured)
    }

    /// Bound to write a two-way length field within
    ///
    /// Falls back to measuring when the source comes after the field and has
    /// not been updated yet.
    pub(super) fn two_way_bound(
        &mut self,
        id: ValueId,
        info: &BindingInfo,
        kind: TargetKind,
    ) -> Result<usize> {
        if let Some(bound) = self.bounds.get(&(id, kind)) {
            return Ok(*bound);
        }
        let measured = match kind {
            TargetKind::ItemLength => self.max_item_length(id)?,
            _ => self.measure(id)?,
        };
        round_trip(info, &Value::UInt(measured as u64))
    }

    /// Discriminant for the concrete type of a polymorphic node
    fn discriminant(&self, id: ValueId) -> Result<Option<Value>> {
        let schema = self.values.schema(id);
        let (Some(table), Some(layout)) = (&schema.subtypes, self.values.layout_of(id)) else {
            return Ok(None);
        };
        table
            .discriminant_for(layout)
            .cloned()
            .map(Some)
            .ok_or_else(|| {
                Error::InvalidData(format!(
                    "'{}' has no discriminant for field '{}'",
                    self.values.type_name(id),
                    schema.name
                ))
            })
    }

    /// Byte length of a node's content, written to a scratch buffer
    pub(super) fn measure(&mut self, id: ValueId) -> Result<usize> {
        if self.measuring.contains(&id) {
            return Err(Error::BindingResolution {
                path: self.values.schema(id).name.clone(),
                reason: "two-way binding depends on its own target".to_string(),
            });
        }

        let scope = self.scope_of(id);
        let mut scratch = BoundedWriter::new();
        self.measuring.push(id);
        let result = self.serialize_content(id, &mut scratch, scope);
        self.measuring.pop();
        result.map(|_| scratch.written().len())
    }

    /// Longest item of a collection
    pub(super) fn max_item_length(&mut self, id: ValueId) -> Result<usize> {
        let mut longest = 0;
        for item in self.values.items(id).to_vec() {
            longest = longest.max(self.measure(item)?);
        }
        Ok(longest)
    }

    /// Scope in effect at a node, derived from its ancestors
    fn scope_of(&self, id: ValueId) -> Scope {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            chain.push(node);
            current = self.values.node(node).parent;
        }
        chain
            .iter()
            .rev()
            .fold(self.defaults, |scope, node| scope.enter(self.values.schema(*node)))
    }
}

/// Value a length reads back as after being stored through `info`
fn round_trip(info: &BindingInfo, measured: &Value) -> Result<usize> {
    info.convert(info.convert_back(measured.clone())?)?.as_usize()
}
