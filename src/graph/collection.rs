//! Collection encoding
//!
//! A collection ends in one of four ways: a fixed or bound item count, a
//! sentinel value after the last item, an item whose member matches a
//! value, or the end of the enclosing window. Item lengths, when given,
//! pad or bound every item to the same size.

use crate::error::{Error, Result};
use crate::graph::deserialize::GraphDeserializer;
use crate::graph::serialize::{GraphSerializer, TargetKind};
use crate::graph::type_graph::NodeId;
use crate::graph::value_graph::ValueId;
use crate::graph::Scope;
use crate::schema::binding::{Binding, LastItemMode};
use crate::schema::types::ElementType;
use crate::schema::value::{ObjectValue, Value};
use crate::stream::primitive::{read_value, write_value};
use crate::stream::reader::BoundedReader;
use crate::stream::writer::BoundedWriter;

fn item_label(index: usize) -> String {
    format!("[{}]", index)
}

// ============================================================================
// Serialize
// ============================================================================

impl<'a, 'g> GraphSerializer<'a, 'g> {
    pub(super) fn serialize_collection(
        &mut self,
        id: ValueId,
        item: NodeId,
        writer: &mut BoundedWriter,
        scope: Scope,
    ) -> Result<()> {
        let schema = self.values.schema(id);

        let mut items = self.values.items(id).to_vec();
        if let Some(count) = schema.count.as_ref().filter(|count| !count.is_two_way()) {
            let count = self.values.resolve_usize(id, count)?;
            items.truncate(count);
            while items.len() < count {
                items.push(self.pad_item(id, item)?);
            }
        }

        let item_length = match &schema.item_length {
            Some(Binding::Bound(info)) if info.is_two_way() => {
                Some(self.two_way_bound(id, info, TargetKind::ItemLength)?)
            }
            Some(length) => Some(self.values.resolve_usize(id, length)?),
            None => None,
        };

        for (index, item) in items.into_iter().enumerate() {
            let result = match item_length {
                Some(len) => writer.with_limit(len, |w| {
                    self.serialize_node(item, w, scope)?;
                    w.pad_to_limit()
                }),
                None => self.serialize_node(item, writer, scope),
            };
            result.map_err(|e| e.serializing(item_label(index)))?;
        }

        if let Some(termination) = &schema.termination {
            let sentinel = self.values.types().node(termination.node);
            let value = self.values.resolve_binding(id, &termination.value)?;
            write_value(
                writer,
                &sentinel.element_type,
                sentinel.serialized_type,
                &value,
                scope.endian,
                scope.encoding,
            )?;
        }
        Ok(())
    }

    /// Append a default item so a short collection fills its count
    fn pad_item(&mut self, id: ValueId, item: NodeId) -> Result<ValueId> {
        let first = self.values.len();
        let padding = self.values.push_item(id)?;
        if let ElementType::Object(type_name) = &self.values.types().node(item).element_type {
            self.values
                .assign(padding, &Value::Object(ObjectValue::new(type_name.as_str())))?;
        }
        self.bind_from(first)?;
        Ok(padding)
    }
}

// ============================================================================
// Deserialize
// ============================================================================

impl<'a, 'g> GraphDeserializer<'a, 'g> {
    pub(super) fn deserialize_collection(
        &mut self,
        id: ValueId,
        reader: &mut BoundedReader,
        scope: Scope,
    ) -> Result<()> {
        let schema = self.values.schema(id);
        self.values.begin_collection(id);

        let item_length = match &schema.item_length {
            Some(length) => Some(self.values.resolve_usize(id, length)?),
            None => None,
        };

        if let Some(count) = &schema.count {
            let count = self.values.resolve_usize(id, count)?;
            for index in 0..count {
                let start = reader.position();
                self.read_item(id, index, item_length, reader, scope)?;
                self.check_progress(id, start, reader)?;
            }
            return Ok(());
        }

        if let Some(termination) = &schema.termination {
            let sentinel_node = self.values.types().node(termination.node);
            let sentinel = self.values.resolve_binding(id, &termination.value)?;
            let mut index = 0;
            while reader.remainder() > 0 {
                let start = reader.position();
                let candidate = read_value(
                    reader,
                    &sentinel_node.element_type,
                    sentinel_node.serialized_type,
                    scope.endian,
                    scope.encoding,
                );
                if matches!(&candidate, Ok(value) if value.loosely_equals(&sentinel)) {
                    return Ok(());
                }
                reader.seek(start)?;
                self.read_item(id, index, item_length, reader, scope)?;
                self.check_progress(id, start, reader)?;
                index += 1;
            }
            return Ok(());
        }

        if let Some(termination) = &schema.item_termination {
            let target = self.values.resolve_binding(id, &termination.value)?;
            let mut index = 0;
            while reader.remainder() > 0 {
                let start = reader.position();
                let item = self.read_item(id, index, item_length, reader, scope)?;
                self.check_progress(id, start, reader)?;
                index += 1;

                if !self.item_member(item, &termination.path).loosely_equals(&target) {
                    continue;
                }
                match termination.mode {
                    LastItemMode::Include => {}
                    LastItemMode::Exclude => {
                        self.values.pop_item(id);
                    }
                    LastItemMode::Defer => {
                        self.values.pop_item(id);
                        reader.seek(start)?;
                    }
                }
                return Ok(());
            }
            return Ok(());
        }

        let mut index = 0;
        while reader.remainder() > 0 {
            let start = reader.position();
            self.read_item(id, index, item_length, reader, scope)?;
            self.check_progress(id, start, reader)?;
            index += 1;
        }
        Ok(())
    }

    fn read_item(
        &mut self,
        id: ValueId,
        index: usize,
        item_length: Option<usize>,
        reader: &mut BoundedReader,
        scope: Scope,
    ) -> Result<ValueId> {
        let item = self.values.push_item(id)?;
        let result = match item_length {
            Some(len) => reader.ensure(len).and_then(|_| {
                reader.with_limit(len, |r| {
                    self.deserialize_node(item, r, scope)?;
                    r.skip_to_limit()
                })
            }),
            None => self.deserialize_node(item, reader, scope),
        };
        result.map_err(|e| e.deserializing(item_label(index)))?;
        Ok(item)
    }

    /// Reject items that consumed nothing, which would loop forever
    fn check_progress(&self, id: ValueId, start: usize, reader: &BoundedReader) -> Result<()> {
        if reader.position() == start {
            return Err(Error::InvalidData(format!(
                "item of '{}' consumed no data",
                self.values.schema(id).name
            )));
        }
        Ok(())
    }

    /// Member of an item by dotted path, the item itself for an empty path
    fn item_member(&self, item: ValueId, path: &str) -> Value {
        let mut current = item;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            match self.values.child_by_name(current, segment) {
                Some(child) => current = child,
                None => return Value::Null,
            }
        }
        self.values.value(current)
    }
}
