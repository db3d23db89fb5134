//! Deserialization walk
//!
//! Reads a value graph in field order. Each object member is read inside a
//! window that leaves room for the fixed-size members after it, so a
//! variable field that overruns fails with `EndOfBound` instead of eating
//! its siblings.

use std::sync::Arc;
use tracing::warn;

use crate::error::{Error, Result};
use crate::graph::type_graph::{LayoutId, NodeKind};
use crate::graph::value_graph::{ValueGraph, ValueId};
use crate::graph::Scope;
use crate::observer::{notify, Phase, SerializationObserver};
use crate::stream::primitive::read_value;
use crate::stream::reader::BoundedReader;

/// Reads one value graph from a stream
pub struct GraphDeserializer<'a, 'g> {
    pub(super) values: &'a mut ValueGraph<'g>,
    observers: &'a [Arc<dyn SerializationObserver>],
    defaults: Scope,
}

impl<'a, 'g> GraphDeserializer<'a, 'g> {
    pub fn new(
        values: &'a mut ValueGraph<'g>,
        observers: &'a [Arc<dyn SerializationObserver>],
        defaults: Scope,
    ) -> Self {
        Self {
            values,
            observers,
            defaults,
        }
    }

    /// Deserialize the graph starting at `root`
    pub fn read(&mut self, root: ValueId, reader: &mut BoundedReader) -> Result<()> {
        let scope = self.defaults;
        self.deserialize_node(root, reader, scope)
    }

    pub(super) fn deserialize_node(
        &mut self,
        id: ValueId,
        reader: &mut BoundedReader,
        scope: Scope,
    ) -> Result<()> {
        if !self.values.is_present(id)? {
            return Ok(());
        }
        let schema = self.values.schema(id);
        let scope = scope.enter(schema);

        match &schema.offset {
            Some(offset) => {
                let position = self.values.resolve_usize(id, offset)?;
                reader.with_offset(position, |r| self.deserialize_bounded(id, r, scope))
            }
            None => self.deserialize_bounded(id, reader, scope),
        }
    }

    fn deserialize_bounded(
        &mut self,
        id: ValueId,
        reader: &mut BoundedReader,
        scope: Scope,
    ) -> Result<()> {
        match &self.values.schema(id).length {
            Some(length) => {
                let len = self.values.resolve_usize(id, length)?;
                reader.ensure(len)?;
                reader.with_limit(len, |r| {
                    self.deserialize_content(id, r, scope)?;
                    r.skip_to_limit()
                })
            }
            None => self.deserialize_content(id, reader, scope),
        }
    }

    fn deserialize_content(
        &mut self,
        id: ValueId,
        reader: &mut BoundedReader,
        scope: Scope,
    ) -> Result<()> {
        let schema = self.values.schema(id);
        match &schema.kind {
            NodeKind::Value => {
                let value = read_value(
                    reader,
                    &schema.element_type,
                    schema.serialized_type,
                    scope.endian,
                    scope.encoding,
                )?;
                self.values.set_scalar(id, value);
                Ok(())
            }
            NodeKind::Object { declared } => self.deserialize_object(id, *declared, reader, scope),
            NodeKind::Collection { .. } => self.deserialize_collection(id, reader, scope),
        }
    }

    /// Concrete layout of an object about to be read, `None` if absent
    fn select_layout(&self, id: ValueId, declared: LayoutId) -> Result<Option<LayoutId>> {
        let schema = self.values.schema(id);
        let types = self.values.types();

        match &schema.subtypes {
            Some(table) => {
                let discriminant = self.values.resolve(id, &table.binding)?;
                let layout = table.match_value(&discriminant);
                if layout.is_none() {
                    warn!(
                        "No subtype of {} matches {:?} for field {}, leaving it empty",
                        types.layout(declared).type_name,
                        discriminant,
                        schema.name
                    );
                }
                Ok(layout)
            }
            None if types.layout(declared).is_abstract => Err(Error::InvalidData(format!(
                "cannot deserialize abstract type '{}' without a subtype",
                types.layout(declared).type_name
            ))),
            None => Ok(Some(declared)),
        }
    }

    fn deserialize_object(
        &mut self,
        id: ValueId,
        declared: LayoutId,
        reader: &mut BoundedReader,
        scope: Scope,
    ) -> Result<()> {
        let layout = self.select_layout(id, declared)?;
        let children = self.values.bind_object(id, layout)?;

        // Bytes the fixed-size members still to come will need
        let mut reserved: usize = children
            .iter()
            .map(|child| self.values.schema(*child).fixed_size.unwrap_or(0))
            .sum();

        for child in children {
            let schema = self.values.schema(child);
            let size = schema.fixed_size.unwrap_or(0);
            reserved = reserved.saturating_sub(size);

            // Trailing members missing from the stream keep their defaults
            if reader.remainder() == 0 && schema.offset.is_none() {
                continue;
            }

            self.notify(Phase::Deserializing, id, child, reader.position())?;
            let result = if schema.offset.is_some() {
                self.deserialize_node(child, reader, scope)
            } else {
                let window = reader.remainder().saturating_sub(reserved).max(size);
                reader.with_limit(window, |r| self.deserialize_node(child, r, scope))
            };
            result.map_err(|e| e.deserializing(schema.name.as_str()))?;
            self.notify(Phase::Deserialized, id, child, reader.position())?;
        }
        Ok(())
    }

    fn notify(&self, phase: Phase, object: ValueId, member: ValueId, offset: usize) -> Result<()> {
        notify(self.observers, &*self.values, phase, object, member, offset)
    }
}
