//! Error types for schema construction and (de)serialization
//!
//! Errors fall into three groups:
//!
//! - [`SchemaError`] - contradictory field metadata, detected while building a type graph
//! - binding and stream failures raised while walking a value graph
//! - field wrappers that attach the offending member name to a lower-level failure

use std::io;
use thiserror::Error;

/// Error raised by an observer hook
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Malformed or contradictory field metadata
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A referenced type is not registered
    #[error("unknown type '{0}'")]
    UnknownType(String),

    /// A type was registered twice
    #[error("type '{0}' is already registered")]
    DuplicateType(String),

    /// Two fields of one type share a name
    #[error("type '{type_name}' declares field '{field}' more than once")]
    DuplicateField { type_name: String, field: String },

    /// The base chain of a type loops back on itself
    #[error("type '{0}' inherits from itself")]
    CyclicInheritance(String),

    /// An exclusive attribute appears more than once on a field
    #[error("field '{field}' declares {attribute} more than once")]
    DuplicateAttribute { field: String, attribute: &'static str },

    /// Two mutually exclusive attributes appear on a field
    #[error("field '{field}' declares both {first} and {second}")]
    ConflictingAttributes {
        field: String,
        first: &'static str,
        second: &'static str,
    },

    /// Subtype options use different binding sources
    #[error("field '{field}': subtypes must all use the same binding")]
    SubtypeBindingMismatch { field: String },

    /// Two subtype options share a discriminant
    #[error("field '{field}': subtype value {value} is used more than once")]
    DuplicateSubtypeValue { field: String, value: String },

    /// A two-way subtype table lists one type twice
    #[error("field '{field}': subtype '{subtype}' is listed more than once for a two-way binding")]
    DuplicateSubtype { field: String, subtype: String },

    /// A subtype option is not derived from the declared type
    #[error("field '{field}': '{subtype}' is not derived from '{declared}'")]
    InvalidSubtype {
        field: String,
        subtype: String,
        declared: String,
    },

    /// An attribute does not apply to the field's element type
    #[error("field '{field}': {attribute} is not valid for {element}")]
    InvalidAttribute {
        field: String,
        attribute: &'static str,
        element: String,
    },

    /// The serialized-type override cannot encode the element type
    #[error("field '{field}': {element} cannot be serialized as {serialized}")]
    IncompatibleSerializedType {
        field: String,
        element: String,
        serialized: String,
    },
}

/// Errors produced by the serialization engine
#[derive(Error, Debug)]
pub enum Error {
    /// Type graph could not be built
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A cross-field reference could not be satisfied
    #[error("cannot resolve binding '{path}': {reason}")]
    BindingResolution { path: String, reason: String },

    /// A binding mixes relative-source parameters that cannot be satisfied together
    #[error("ambiguous binding '{path}': {reason}")]
    AmbiguousBinding { path: String, reason: String },

    /// The requested feature is not supported
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The underlying data ended
    #[error("end of stream: need {needed} bytes, have {available}")]
    EndOfStream { needed: usize, available: usize },

    /// A declared length bound was exhausted before the underlying data
    #[error("end of bound: need {needed} bytes, have {available}")]
    EndOfBound { needed: usize, available: usize },

    /// Wraps a failure while writing a member
    #[error("error serializing '{field}': {source}")]
    FieldSerialization {
        field: String,
        #[source]
        source: Box<Error>,
    },

    /// Wraps a failure while reading a member
    #[error("error deserializing '{field}': {source}")]
    FieldDeserialization {
        field: String,
        #[source]
        source: Box<Error>,
    },

    /// Data does not represent a valid value
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A value does not fit its serialized representation
    #[error("value {value} is out of range for {target}")]
    ValueOutOfRange { value: String, target: &'static str },

    /// An observer aborted the call
    #[error("observer aborted at '{member}': {source}")]
    Observer {
        member: String,
        #[source]
        source: ObserverError,
    },

    /// Value nesting exceeded the configured depth
    #[error("maximum nesting depth {0} exceeded")]
    DepthExceeded(usize),

    /// Underlying transport failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap this error with the name of the member being written
    pub fn serializing(self, field: impl Into<String>) -> Self {
        Error::FieldSerialization {
            field: field.into(),
            source: Box::new(self),
        }
    }

    /// Wrap this error with the name of the member being read
    pub fn deserializing(self, field: impl Into<String>) -> Self {
        Error::FieldDeserialization {
            field: field.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error beneath any field wrappers
    pub fn root_cause(&self) -> &Error {
        let mut current = self;
        while let Error::FieldSerialization { source, .. }
        | Error::FieldDeserialization { source, .. } = current
        {
            current = &**source;
        }
        current
    }

    /// Member names from the outermost wrapper inwards
    pub fn field_path(&self) -> Vec<&str> {
        let mut path = Vec::new();
        let mut current = self;
        while let Error::FieldSerialization { field, source }
        | Error::FieldDeserialization { field, source } = current
        {
            path.push(field.as_str());
            current = &**source;
        }
        path
    }

    /// True when the underlying data ran out
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self.root_cause(), Error::EndOfStream { .. })
    }

    /// True when a declared bound ran out
    pub fn is_end_of_bound(&self) -> bool {
        matches!(self.root_cause(), Error::EndOfBound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_nested_fields() {
        let err = Error::EndOfStream {
            needed: 4,
            available: 1,
        }
        .deserializing("length")
        .deserializing("header");

        assert!(err.is_end_of_stream());
        assert!(!err.is_end_of_bound());
        assert_eq!(err.field_path(), vec!["header", "length"]);
    }

    #[test]
    fn test_display_names_field() {
        let err = Error::EndOfBound {
            needed: 2,
            available: 0,
        }
        .serializing("payload");
        let message = err.to_string();
        assert!(message.contains("payload"));
        assert!(message.contains("end of bound"));
    }

    #[test]
    fn test_schema_error_converts() {
        let err: Error = SchemaError::UnknownType("Missing".into()).into();
        assert!(matches!(err, Error::Schema(SchemaError::UnknownType(_))));
    }
}
