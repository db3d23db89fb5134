//! Graph Module - Schema and Value Graphs
//!
//! The [`TypeGraph`] is built once per root type and shared. A
//! [`ValueGraph`] pairs it with one value for the duration of a single
//! serialize or deserialize call.

pub mod collection;
pub mod deserialize;
pub mod resolver;
pub mod serialize;
pub mod type_graph;
pub mod value_graph;

pub use deserialize::GraphDeserializer;
pub use resolver::Source;
pub use serialize::GraphSerializer;
pub use type_graph::{
    CollectionShape, LayoutId, NodeId, NodeKind, ObjectLayout, SubtypeTable, Termination,
    TypeGraph, TypeNode,
};
pub use value_graph::{NodeState, ValueGraph, ValueId, ValueNode};

use crate::schema::types::{Endian, TextEncoding};

/// Byte order and text codec in effect for a subtree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    pub endian: Endian,
    pub encoding: TextEncoding,
}

impl Scope {
    pub fn new(endian: Endian, encoding: TextEncoding) -> Self {
        Self { endian, encoding }
    }

    /// Scope inside a node, applying its overrides
    pub fn enter(self, node: &TypeNode) -> Self {
        Self {
            endian: node.endianness.unwrap_or(self.endian),
            encoding: node.encoding.unwrap_or(self.encoding),
        }
    }
}
