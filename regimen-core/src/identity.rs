//! Identity types for REGIMEN entities

use crate::EntityType;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::hash::Hash;
use uuid::Uuid;

/// Raw entity identifier. UUIDv7 keeps ids sortable by creation time.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// A single canonical calendar day. Scheduling never looks below day granularity.
pub type CalendarDate = NaiveDate;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Common behavior for strongly-typed entity identifiers.
///
/// Each id wraps a [`Uuid`] but is a distinct type, so a `PatientId` can
/// never be passed where an `AssignmentId` is expected.
pub trait EntityIdType:
    Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Entity kind this id refers to.
    const ENTITY_TYPE: EntityType;

    /// Wrap an existing UUID.
    fn new(uuid: Uuid) -> Self;

    /// Unwrap to the underlying UUID.
    fn as_uuid(&self) -> Uuid;

    /// Generate a fresh, time-ordered id.
    fn now_v7() -> Self {
        Self::new(Uuid::now_v7())
    }

    /// The all-zero id.
    fn nil() -> Self {
        Self::new(Uuid::nil())
    }
}

macro_rules! define_entity_id {
    ($(#[$meta:meta])* $name:ident => $entity:expr) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl EntityIdType for $name {
            const ENTITY_TYPE: EntityType = $entity;

            fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

define_entity_id!(
    /// Tenant (care organisation) owning patients and protocols.
    TenantId => EntityType::Tenant
);
define_entity_id!(
    /// Patient whose schedule is being materialized.
    PatientId => EntityType::Patient
);
define_entity_id!(
    /// Protocol template identifier.
    ProtocolId => EntityType::Protocol
);
define_entity_id!(
    /// Stable id of a task inside a protocol template.
    TemplateTaskId => EntityType::TemplateTask
);
define_entity_id!(
    /// Link between a patient and a protocol.
    AssignmentId => EntityType::Assignment
);
define_entity_id!(
    /// Materialized task instance.
    InstanceId => EntityType::Instance
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entity_id_is_v7() {
        let id = new_entity_id();
        assert_eq!(id.get_version_num(), 7);
    }

    #[test]
    fn test_typed_id_roundtrips_through_string() {
        let id = PatientId::now_v7();
        let parsed: PatientId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_typed_id_serializes_as_bare_uuid() {
        let uuid = Uuid::now_v7();
        let id = InstanceId::new(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", uuid));
    }

    #[test]
    fn test_typed_id_entity_type() {
        assert_eq!(AssignmentId::ENTITY_TYPE, EntityType::Assignment);
        assert_eq!(TemplateTaskId::nil().as_uuid(), Uuid::nil());
    }
}
