//! REGIMEN Core - Entity Types
//!
//! Pure data structures for the protocol scheduling engine. All other crates
//! depend on this. Scheduling logic lives in `regimen-engine`; persistence
//! lives behind the port in `regimen-storage`.

mod config;
mod entities;
mod enums;
mod error;
mod identity;

pub use config::{SchedulerConfig, DEFAULT_HORIZON_DAYS, DEFAULT_MONTHLY_INTERVAL_DAYS};
pub use entities::{
    CompletionPayload, LogicalKey, Patient, ProtocolAssignment, ProtocolTemplate,
    RecurrencePolicy, TaskInstance, TaskInstanceDraft, TemplateTask,
};
pub use enums::{
    AssignmentStatus, EntityType, EnumParseError, IntervalType, RecoveryPhase, TaskKind,
    TaskStatus,
};
pub use error::{ConfigError, RegimenError, RegimenResult, ScheduleError, StorageError};
pub use identity::{
    new_entity_id, AssignmentId, CalendarDate, EntityId, EntityIdType, InstanceId, PatientId,
    ProtocolId, TemplateTaskId, TenantId, Timestamp,
};
