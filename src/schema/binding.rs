//! Bindings - Cross-Field References
//!
//! A binding points a dependent field at the value that drives it: a
//! length prefix, an item count, a discriminant, a presence flag. Bindings
//! are addressed relative to the field that declares them.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::schema::value::Value;

// ============================================================================
// Binding Modes
// ============================================================================

/// Where the walk for a binding source starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RelativeSourceMode {
    /// The object containing the bound field
    #[default]
    SelfObject,
    /// An enclosing object, selected by level or by type
    FindAncestor,
    /// The previously serialized sibling (not supported)
    PreviousData,
    /// The value passed alongside the call
    SerializationContext,
}

/// Direction of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BindingMode {
    /// The source is updated from the bound field when serializing
    #[default]
    TwoWay,
    /// The source is only read
    OneWay,
}

// ============================================================================
// Converters
// ============================================================================

/// Transforms values crossing a binding
///
/// `convert` maps a source value to what the bound field consumes;
/// `convert_back` maps a measured value back into the source's domain.
pub trait ValueConverter: Send + Sync + fmt::Debug {
    fn convert(&self, value: &Value) -> Result<Value>;

    fn convert_back(&self, value: &Value) -> Result<Value>;
}

/// Scales a source value by a constant factor
///
/// Useful for lengths stored in words rather than bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleConverter {
    factor: u64,
}

impl ScaleConverter {
    pub fn new(factor: u64) -> Self {
        Self {
            factor: factor.max(1),
        }
    }
}

impl ValueConverter for ScaleConverter {
    fn convert(&self, value: &Value) -> Result<Value> {
        let n = value.as_uint().ok_or_else(|| Error::ValueOutOfRange {
            value: format!("{:?}", value),
            target: "u64",
        })?;
        n.checked_mul(self.factor)
            .map(Value::UInt)
            .ok_or_else(|| Error::ValueOutOfRange {
                value: n.to_string(),
                target: "u64",
            })
    }

    fn convert_back(&self, value: &Value) -> Result<Value> {
        let n = value.as_uint().ok_or_else(|| Error::ValueOutOfRange {
            value: format!("{:?}", value),
            target: "u64",
        })?;
        // Round up so the bound always covers the content
        Ok(Value::UInt(n.div_ceil(self.factor)))
    }
}

// ============================================================================
// Binding Descriptors
// ============================================================================

/// Relative reference to a source value
#[derive(Clone)]
pub struct BindingInfo {
    /// Dotted member path from the source object
    pub path: String,
    pub relative_source: RelativeSourceMode,
    /// Number of enclosing objects to climb (1 = the containing object)
    pub ancestor_level: Option<usize>,
    /// Type name of the enclosing object to stop at
    pub ancestor_type: Option<String>,
    pub mode: BindingMode,
    pub converter: Option<Arc<dyn ValueConverter>>,
}

impl BindingInfo {
    /// Bind to a member of the containing object
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            relative_source: RelativeSourceMode::SelfObject,
            ancestor_level: None,
            ancestor_type: None,
            mode: BindingMode::TwoWay,
            converter: None,
        }
    }

    /// Bind to a member of the call-scoped context value
    pub fn context(path: impl Into<String>) -> Self {
        Self {
            relative_source: RelativeSourceMode::SerializationContext,
            mode: BindingMode::OneWay,
            ..Self::path(path)
        }
    }

    /// Bind to the previously serialized sibling
    pub fn previous_data(path: impl Into<String>) -> Self {
        Self {
            relative_source: RelativeSourceMode::PreviousData,
            ..Self::path(path)
        }
    }

    /// Builder pattern: climb `level` enclosing objects
    pub fn ancestor(mut self, level: usize) -> Self {
        self.relative_source = RelativeSourceMode::FindAncestor;
        self.ancestor_level = Some(level);
        self
    }

    /// Builder pattern: climb to the nearest enclosing object of a type
    pub fn ancestor_of_type(mut self, type_name: impl Into<String>) -> Self {
        self.relative_source = RelativeSourceMode::FindAncestor;
        self.ancestor_type = Some(type_name.into());
        self
    }

    /// Builder pattern: read the source only
    pub fn one_way(mut self) -> Self {
        self.mode = BindingMode::OneWay;
        self
    }

    /// Builder pattern: update the source when serializing
    pub fn two_way(mut self) -> Self {
        self.mode = BindingMode::TwoWay;
        self
    }

    /// Builder pattern: attach a converter
    pub fn with_converter(mut self, converter: impl ValueConverter + 'static) -> Self {
        self.converter = Some(Arc::new(converter));
        self
    }

    /// True when serializing writes the measured value back to the source
    pub fn is_two_way(&self) -> bool {
        self.mode == BindingMode::TwoWay
            && self.relative_source != RelativeSourceMode::SerializationContext
    }

    /// Check that the relative-source parameters can be satisfied together
    pub fn validate(&self) -> Result<()> {
        let ambiguous = |reason: &str| Error::AmbiguousBinding {
            path: self.path.clone(),
            reason: reason.to_string(),
        };

        match self.relative_source {
            RelativeSourceMode::PreviousData => Err(Error::NotSupported(format!(
                "binding '{}': previous-data relative source",
                self.path
            ))),
            RelativeSourceMode::FindAncestor => {
                match (self.ancestor_level, &self.ancestor_type) {
                    (Some(_), Some(_)) => {
                        Err(ambiguous("both an ancestor level and an ancestor type are set"))
                    }
                    (None, None) => Err(ambiguous("ancestor mode needs a level or a type")),
                    (Some(0), None) => Err(ambiguous("ancestor level must be at least 1")),
                    _ => Ok(()),
                }
            }
            RelativeSourceMode::SelfObject | RelativeSourceMode::SerializationContext => {
                if self.ancestor_level.is_some() || self.ancestor_type.is_some() {
                    return Err(ambiguous("ancestor parameters require ancestor mode"));
                }
                if self.relative_source == RelativeSourceMode::SerializationContext
                    && self.mode == BindingMode::TwoWay
                {
                    return Err(ambiguous("the serialization context is read-only"));
                }
                Ok(())
            }
        }
    }

    /// Apply the converter in the source-to-target direction
    pub fn convert(&self, value: Value) -> Result<Value> {
        match &self.converter {
            Some(converter) => converter.convert(&value),
            None => Ok(value),
        }
    }

    /// Apply the converter in the target-to-source direction
    pub fn convert_back(&self, value: Value) -> Result<Value> {
        match &self.converter {
            Some(converter) => converter.convert_back(&value),
            None => Ok(value),
        }
    }

    /// Same source location and direction, ignoring the converter
    pub fn same_source(&self, other: &BindingInfo) -> bool {
        self.path == other.path
            && self.relative_source == other.relative_source
            && self.ancestor_level == other.ancestor_level
            && self.ancestor_type == other.ancestor_type
            && self.mode == other.mode
    }
}

impl PartialEq for BindingInfo {
    fn eq(&self, other: &Self) -> bool {
        let same_converter = match (&self.converter, &other.converter) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        self.same_source(other) && same_converter
    }
}

impl fmt::Debug for BindingInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingInfo")
            .field("path", &self.path)
            .field("relative_source", &self.relative_source)
            .field("ancestor_level", &self.ancestor_level)
            .field("ancestor_type", &self.ancestor_type)
            .field("mode", &self.mode)
            .field("converter", &self.converter.is_some())
            .finish()
    }
}

/// Constant or bound source for a length, count, offset or sentinel
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Const(Value),
    Bound(BindingInfo),
}

impl Binding {
    pub fn constant(value: impl Into<Value>) -> Self {
        Binding::Const(value.into())
    }

    /// Constant value, if this binding is not bound
    pub fn as_const(&self) -> Option<&Value> {
        match self {
            Binding::Const(v) => Some(v),
            Binding::Bound(_) => None,
        }
    }

    pub fn as_bound(&self) -> Option<&BindingInfo> {
        match self {
            Binding::Const(_) => None,
            Binding::Bound(info) => Some(info),
        }
    }

    /// True for bound sources that serializing writes back to
    pub fn is_two_way(&self) -> bool {
        self.as_bound().is_some_and(BindingInfo::is_two_way)
    }
}

impl From<BindingInfo> for Binding {
    fn from(info: BindingInfo) -> Self {
        Binding::Bound(info)
    }
}

impl From<Value> for Binding {
    fn from(value: Value) -> Self {
        Binding::Const(value)
    }
}

impl From<usize> for Binding {
    fn from(n: usize) -> Self {
        Binding::Const(Value::UInt(n as u64))
    }
}

// ============================================================================
// Conditions and Termination
// ============================================================================

/// Comparison applied by a serialize-when condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[default]
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl ComparisonOperator {
    /// Compare with type coercion; incomparable values only satisfy `NotEqual`
    pub fn apply(self, lhs: &Value, rhs: &Value) -> bool {
        match self {
            ComparisonOperator::Equal => lhs.loosely_equals(rhs),
            ComparisonOperator::NotEqual => !lhs.loosely_equals(rhs),
            ComparisonOperator::LessThan => lhs.loose_cmp(rhs) == Some(Ordering::Less),
            ComparisonOperator::LessThanOrEqual => {
                matches!(lhs.loose_cmp(rhs), Some(Ordering::Less | Ordering::Equal))
            }
            ComparisonOperator::GreaterThan => lhs.loose_cmp(rhs) == Some(Ordering::Greater),
            ComparisonOperator::GreaterThanOrEqual => {
                matches!(lhs.loose_cmp(rhs), Some(Ordering::Greater | Ordering::Equal))
            }
        }
    }
}

/// Serialize-when predicate: the field is present when the bound value
/// compares to `value`
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub binding: BindingInfo,
    pub value: Value,
    pub operator: ComparisonOperator,
}

impl Condition {
    pub fn new(binding: BindingInfo, value: impl Into<Value>) -> Self {
        Self {
            binding,
            value: value.into(),
            operator: ComparisonOperator::Equal,
        }
    }

    pub fn with_operator(mut self, operator: ComparisonOperator) -> Self {
        self.operator = operator;
        self
    }
}

/// What happens to the item that ends an item-terminated collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LastItemMode {
    /// Keep it as the last element
    #[default]
    Include,
    /// Consume it and drop it
    Exclude,
    /// Drop it and leave its bytes for the next field
    Defer,
}

/// Per-item termination: stop after an item whose member equals a value
#[derive(Debug, Clone, PartialEq)]
pub struct ItemTermination {
    /// Dotted path inside the item; empty compares the item itself
    pub path: String,
    pub value: Binding,
    pub mode: LastItemMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_previous_data_not_supported() {
        let err = BindingInfo::previous_data("length").validate().unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
    }

    #[test]
    fn test_ambiguous_ancestor_parameters() {
        let both = BindingInfo::path("x").ancestor(2).ancestor_of_type("Outer");
        assert!(matches!(both.validate(), Err(Error::AmbiguousBinding { .. })));

        let mut neither = BindingInfo::path("x");
        neither.relative_source = RelativeSourceMode::FindAncestor;
        assert!(matches!(neither.validate(), Err(Error::AmbiguousBinding { .. })));

        let zero = BindingInfo::path("x").ancestor(0);
        assert!(matches!(zero.validate(), Err(Error::AmbiguousBinding { .. })));

        let mut stray = BindingInfo::path("x");
        stray.ancestor_level = Some(1);
        assert!(matches!(stray.validate(), Err(Error::AmbiguousBinding { .. })));
    }

    #[test]
    fn test_context_bindings_are_read_only() {
        let binding = BindingInfo::context("version");
        assert!(binding.validate().is_ok());
        assert!(!binding.is_two_way());
        assert!(binding.clone().two_way().validate().is_err());
    }

    #[test]
    fn test_valid_bindings() {
        assert!(BindingInfo::path("length").validate().is_ok());
        assert!(BindingInfo::path("length").ancestor(2).validate().is_ok());
        assert!(BindingInfo::path("kind").ancestor_of_type("Frame").validate().is_ok());
    }

    #[test]
    fn test_operators_coerce() {
        let op = ComparisonOperator::GreaterThan;
        assert!(op.apply(&Value::UInt(5), &Value::Int(3)));
        assert!(!op.apply(&Value::UInt(3), &Value::Int(3)));
        assert!(ComparisonOperator::Equal.apply(&Value::Bool(true), &Value::UInt(1)));
        assert!(ComparisonOperator::NotEqual.apply(&Value::from("a"), &Value::UInt(1)));
        assert!(ComparisonOperator::LessThanOrEqual.apply(&Value::Float(2.0), &Value::UInt(2)));
    }

    #[test]
    fn test_scale_converter() {
        let words = ScaleConverter::new(4);
        assert_eq!(words.convert(&Value::UInt(3)).unwrap(), Value::UInt(12));
        assert_eq!(words.convert_back(&Value::UInt(12)).unwrap(), Value::UInt(3));
        assert_eq!(words.convert_back(&Value::UInt(13)).unwrap(), Value::UInt(4));
    }

    #[test]
    fn test_binding_equality_ignores_converter_identity_only_when_shared() {
        let shared = BindingInfo::path("len").with_converter(ScaleConverter::new(2));
        assert_eq!(shared, shared.clone());
        let other = BindingInfo::path("len").with_converter(ScaleConverter::new(2));
        assert_ne!(shared, other);
        assert!(shared.same_source(&other));
    }
}
