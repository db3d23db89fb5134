//! Binary Serializer - Public Entry Point
//!
//! Owns the type registry and a cache of built type graphs. Each call pairs
//! the cached graph with a fresh value graph, so one serializer can be
//! shared across threads.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::graph::{GraphDeserializer, GraphSerializer, Scope, TypeGraph, ValueGraph};
use crate::observer::SerializationObserver;
use crate::schema::descriptor::TypeRegistry;
use crate::schema::types::{Endian, TextEncoding};
use crate::schema::value::Value;
use crate::stream::reader::BoundedReader;
use crate::stream::writer::BoundedWriter;

/// Defaults applied to fields that declare no override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerConfig {
    pub endianness: Endian,
    pub encoding: TextEncoding,
    /// Deepest value nesting accepted before the call fails
    pub max_depth: usize,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            endianness: Endian::Little,
            encoding: TextEncoding::Utf8,
            max_depth: 64,
        }
    }
}

/// Host type with a registered binary layout
pub trait BinaryRecord: Sized {
    /// Registered name of the root type
    const TYPE_NAME: &'static str;

    /// Register the descriptors this type needs
    fn register(registry: &mut TypeRegistry) -> std::result::Result<(), SchemaError>;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self>;
}

/// Serializes registered types to and from bytes
pub struct BinarySerializer {
    registry: TypeRegistry,
    config: SerializerConfig,
    graphs: RwLock<HashMap<String, Arc<TypeGraph>>>,
    observers: Vec<Arc<dyn SerializationObserver>>,
}

impl BinarySerializer {
    pub fn new(registry: TypeRegistry) -> Self {
        Self {
            registry,
            config: SerializerConfig::default(),
            graphs: RwLock::new(HashMap::new()),
            observers: Vec::new(),
        }
    }

    /// Serializer for a single record type and whatever it registers
    pub fn for_record<T: BinaryRecord>() -> Result<Self> {
        let mut registry = TypeRegistry::new();
        T::register(&mut registry)?;
        Ok(Self::new(registry))
    }

    pub fn with_config(mut self, config: SerializerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add an observer notified around every object member
    pub fn with_observer(mut self, observer: Arc<dyn SerializationObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    fn scope(&self) -> Scope {
        Scope::new(self.config.endianness, self.config.encoding)
    }

    /// Type graph for a registered type, built on first use
    pub fn type_graph(&self, type_name: &str) -> Result<Arc<TypeGraph>> {
        if let Some(graph) = self.graphs.read().get(type_name) {
            debug!("Reusing type graph for {}", type_name);
            return Ok(Arc::clone(graph));
        }

        let graph = Arc::new(TypeGraph::build(&self.registry, type_name)?);
        let mut graphs = self.graphs.write();
        Ok(Arc::clone(
            graphs.entry(type_name.to_string()).or_insert(graph),
        ))
    }

    // ========================================================================
    // Serialize
    // ========================================================================

    pub fn serialize(&self, type_name: &str, value: &Value) -> Result<Vec<u8>> {
        self.serialize_with_context(type_name, value, None)
    }

    /// Serialize with a context value visible to context bindings
    pub fn serialize_with_context(
        &self,
        type_name: &str,
        value: &Value,
        context: Option<Value>,
    ) -> Result<Vec<u8>> {
        let types = self.type_graph(type_name)?;
        let mut values = ValueGraph::new(&types, context, self.config.max_depth);
        let root = values.add_root()?;
        values.assign(root, value)?;

        let mut writer = BoundedWriter::new();
        let mut walker = GraphSerializer::new(&mut values, &self.observers, self.scope());
        walker.bind()?;
        walker.write(root, &mut writer)?;

        debug!("Serialized {} into {} bytes", type_name, writer.position());
        Ok(writer.into_inner())
    }

    /// Serialize into a writer, returning the number of bytes written
    pub fn serialize_into<W: Write>(
        &self,
        type_name: &str,
        value: &Value,
        output: &mut W,
    ) -> Result<usize> {
        let bytes = self.serialize(type_name, value)?;
        output.write_all(&bytes)?;
        Ok(bytes.len())
    }

    pub fn serialize_record<T: BinaryRecord>(&self, record: &T) -> Result<Vec<u8>> {
        self.serialize(T::TYPE_NAME, &record.to_value())
    }

    // ========================================================================
    // Deserialize
    // ========================================================================

    pub fn deserialize(&self, type_name: &str, data: &[u8]) -> Result<Value> {
        self.deserialize_with_context(type_name, data, None)
    }

    /// Deserialize with a context value visible to context bindings
    pub fn deserialize_with_context(
        &self,
        type_name: &str,
        data: &[u8],
        context: Option<Value>,
    ) -> Result<Value> {
        let types = self.type_graph(type_name)?;
        let mut values = ValueGraph::new(&types, context, self.config.max_depth);
        let root = values.add_root()?;

        let mut reader = BoundedReader::new(data);
        GraphDeserializer::new(&mut values, &self.observers, self.scope()).read(root, &mut reader)?;

        debug!(
            "Deserialized {} from {} of {} bytes",
            type_name,
            reader.position(),
            data.len()
        );
        Ok(values.value(root))
    }

    /// Read the whole input, then deserialize it
    pub fn deserialize_from<R: Read>(&self, type_name: &str, input: &mut R) -> Result<Value> {
        let mut data = Vec::new();
        input.read_to_end(&mut data)?;
        self.deserialize(type_name, &data)
    }

    pub fn deserialize_record<T: BinaryRecord>(&self, data: &[u8]) -> Result<T> {
        T::from_value(self.deserialize(T::TYPE_NAME, data)?)
    }
}

impl std::fmt::Debug for BinarySerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinarySerializer")
            .field("config", &self.config)
            .field("cached_graphs", &self.graphs.read().len())
            .field("observers", &self.observers.len())
            .finish()
    }
}
