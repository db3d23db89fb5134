//! Observer Hooks - Member Notifications
//!
//! Observers are told before and after every object member is written or
//! read. They see the owning type, the member name, the stream offset and,
//! once the member is done, its value. They cannot change the encoding, but
//! returning an error aborts the call.

use std::sync::Arc;
use tracing::trace;

use crate::error::{Error, ObserverError, Result};
use crate::graph::value_graph::{ValueGraph, ValueId};
use crate::schema::binding::BindingInfo;
use crate::schema::value::Value;

/// Notification payload for one member
#[derive(Debug, Clone, Copy)]
pub struct MemberEvent<'a> {
    /// Concrete type of the object owning the member
    pub owner: &'a str,
    pub member: &'a str,
    /// Member value, present after the member was processed
    pub value: Option<&'a Value>,
    /// Stream position when the event fired
    pub offset: usize,
}

/// Binding resolution scoped to the object owning the member
pub struct BindingContext<'a> {
    values: &'a ValueGraph<'a>,
    object: ValueId,
}

impl<'a> BindingContext<'a> {
    pub fn new(values: &'a ValueGraph<'a>, object: ValueId) -> Self {
        Self { values, object }
    }

    /// Concrete type of the owning object
    pub fn owner_type(&self) -> String {
        self.values.type_name(self.object)
    }

    /// Value of a member of the owning object, by dotted path
    pub fn value(&self, path: &str) -> Result<Value> {
        self.resolve(&BindingInfo::path(path).one_way())
    }

    /// Resolve a binding as if declared on a member of the owning object
    pub fn resolve(&self, binding: &BindingInfo) -> Result<Value> {
        self.values.resolve_from_object(self.object, binding)
    }
}

/// Receives member notifications during serialize and deserialize
///
/// All hooks default to doing nothing.
pub trait SerializationObserver: Send + Sync {
    fn member_serializing(
        &self,
        _event: &MemberEvent<'_>,
        _context: &BindingContext<'_>,
    ) -> std::result::Result<(), ObserverError> {
        Ok(())
    }

    fn member_serialized(
        &self,
        _event: &MemberEvent<'_>,
        _context: &BindingContext<'_>,
    ) -> std::result::Result<(), ObserverError> {
        Ok(())
    }

    fn member_deserializing(
        &self,
        _event: &MemberEvent<'_>,
        _context: &BindingContext<'_>,
    ) -> std::result::Result<(), ObserverError> {
        Ok(())
    }

    fn member_deserialized(
        &self,
        _event: &MemberEvent<'_>,
        _context: &BindingContext<'_>,
    ) -> std::result::Result<(), ObserverError> {
        Ok(())
    }
}

/// Logs every notification at trace level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SerializationObserver for TracingObserver {
    fn member_serializing(
        &self,
        event: &MemberEvent<'_>,
        _context: &BindingContext<'_>,
    ) -> std::result::Result<(), ObserverError> {
        trace!("Serializing {}.{} at {}", event.owner, event.member, event.offset);
        Ok(())
    }

    fn member_serialized(
        &self,
        event: &MemberEvent<'_>,
        _context: &BindingContext<'_>,
    ) -> std::result::Result<(), ObserverError> {
        trace!(
            "Serialized {}.{} = {:?}, now at {}",
            event.owner,
            event.member,
            event.value,
            event.offset
        );
        Ok(())
    }

    fn member_deserializing(
        &self,
        event: &MemberEvent<'_>,
        _context: &BindingContext<'_>,
    ) -> std::result::Result<(), ObserverError> {
        trace!("Deserializing {}.{} at {}", event.owner, event.member, event.offset);
        Ok(())
    }

    fn member_deserialized(
        &self,
        event: &MemberEvent<'_>,
        _context: &BindingContext<'_>,
    ) -> std::result::Result<(), ObserverError> {
        trace!(
            "Deserialized {}.{} = {:?}, now at {}",
            event.owner,
            event.member,
            event.value,
            event.offset
        );
        Ok(())
    }
}

/// Notification point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Serializing,
    Serialized,
    Deserializing,
    Deserialized,
}

/// Deliver one notification to every observer, stopping at the first error
pub(crate) fn dispatch(
    observers: &[Arc<dyn SerializationObserver>],
    phase: Phase,
    event: &MemberEvent<'_>,
    context: &BindingContext<'_>,
) -> Result<()> {
    for observer in observers {
        let outcome = match phase {
            Phase::Serializing => observer.member_serializing(event, context),
            Phase::Serialized => observer.member_serialized(event, context),
            Phase::Deserializing => observer.member_deserializing(event, context),
            Phase::Deserialized => observer.member_deserialized(event, context),
        };
        outcome.map_err(|source| Error::Observer {
            member: event.member.to_string(),
            source,
        })?;
    }
    Ok(())
}

/// Fire a notification for a member of `object` if anyone listens
pub(crate) fn notify(
    observers: &[Arc<dyn SerializationObserver>],
    values: &ValueGraph<'_>,
    phase: Phase,
    object: ValueId,
    member: ValueId,
    offset: usize,
) -> Result<()> {
    if observers.is_empty() {
        return Ok(());
    }

    let owner = values.type_name(object);
    let name = values.schema(member).name.as_str();
    let value = match phase {
        Phase::Serialized | Phase::Deserialized => Some(values.value(member)),
        Phase::Serializing | Phase::Deserializing => None,
    };
    let event = MemberEvent {
        owner: &owner,
        member: name,
        value: value.as_ref(),
        offset,
    };
    dispatch(observers, phase, &event, &BindingContext::new(values, object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::type_graph::TypeGraph;
    use crate::schema::descriptor::{FieldDescriptor, ObjectDescriptor, TypeRegistry};
    use crate::schema::types::ElementType;
    use crate::schema::value::ObjectValue;

    fn header() -> TypeGraph {
        let registry = TypeRegistry::new()
            .with(
                ObjectDescriptor::new("Header")
                    .field(FieldDescriptor::new("version", ElementType::U8))
                    .field(FieldDescriptor::new("flags", ElementType::U16)),
            )
            .unwrap();
        TypeGraph::build(&registry, "Header").unwrap()
    }

    struct Rejecting;

    impl SerializationObserver for Rejecting {
        fn member_deserializing(
            &self,
            event: &MemberEvent<'_>,
            _context: &BindingContext<'_>,
        ) -> std::result::Result<(), ObserverError> {
            Err(format!("{} is not allowed", event.member).into())
        }
    }

    #[test]
    fn test_binding_context_reads_owner_members() {
        let types = header();
        let mut values = ValueGraph::new(&types, None, 8);
        let root = values.add_root().unwrap();
        let header = ObjectValue::new("Header").with("version", 3u8).with("flags", 9u16);
        values.assign(root, &header.into()).unwrap();

        let context = BindingContext::new(&values, root);
        assert_eq!(context.owner_type(), "Header");
        assert_eq!(context.value("flags").unwrap(), Value::UInt(9));
        assert!(context.value("missing").is_err());
    }

    #[test]
    fn test_notify_attaches_values_after_processing() {
        let types = header();
        let mut values = ValueGraph::new(&types, None, 8);
        let root = values.add_root().unwrap();
        values
            .assign(root, &ObjectValue::new("Header").with("version", 1u8).into())
            .unwrap();
        let version = values.child_by_name(root, "version").unwrap();

        let observers: Vec<Arc<dyn SerializationObserver>> = vec![Arc::new(TracingObserver)];
        for phase in [
            Phase::Serializing,
            Phase::Serialized,
            Phase::Deserializing,
            Phase::Deserialized,
        ] {
            notify(&observers, &values, phase, root, version, 0).unwrap();
        }

        let observers: Vec<Arc<dyn SerializationObserver>> =
            vec![Arc::new(TracingObserver), Arc::new(Rejecting)];
        let err = notify(&observers, &values, Phase::Deserializing, root, version, 0).unwrap_err();
        assert!(matches!(err, Error::Observer { ref member, .. } if member == "version"));
        assert!(err.to_string().contains("version is not allowed"));
    }
}
