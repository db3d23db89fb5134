//! Stream Module - Bounded Cursors and Primitive Codecs
//!
//! Readers and writers that can be narrowed to a declared length for the
//! duration of one field, reporting exhaustion of the bound separately from
//! exhaustion of the data.

pub mod primitive;
pub mod reader;
pub mod writer;

pub use primitive::{read_value, read_varint, write_value, write_varint, Primitive};
pub use reader::BoundedReader;
pub use writer::BoundedWriter;
