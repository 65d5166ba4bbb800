//! Error types for REGIMEN operations

use crate::{AssignmentId, CalendarDate, EntityType, PatientId, ProtocolId, TemplateTaskId};
use thiserror::Error;
use uuid::Uuid;

/// Storage layer errors. Every variant is a persistence failure and is safe
/// to retry, since engine operations are idempotent or transactional.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: Uuid },

    #[error("Insert failed for {entity_type:?}: {reason}")]
    InsertFailed { entity_type: EntityType, reason: String },

    #[error("Update failed for {entity_type:?} with id {id}: {reason}")]
    UpdateFailed {
        entity_type: EntityType,
        id: Uuid,
        reason: String,
    },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Unique constraint violated on {entity_type:?}: {constraint}")]
    UniqueViolation {
        entity_type: EntityType,
        constraint: String,
    },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Scheduling errors raised by the engine itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Protocol template not found: {protocol_id}")]
    TemplateNotFound { protocol_id: ProtocolId },

    #[error("Patient not found: {patient_id}")]
    PatientNotFound { patient_id: PatientId },

    #[error("No active assignment of protocol {protocol_id} for patient {patient_id}")]
    AssignmentNotFound {
        patient_id: PatientId,
        protocol_id: ProtocolId,
    },

    #[error("Invalid recurrence policy on task {task_id}: {reason}")]
    InvalidRecurrencePolicy {
        task_id: TemplateTaskId,
        reason: String,
    },

    #[error("Invalid protocol template {protocol_id}: {reason}")]
    InvalidTemplate {
        protocol_id: ProtocolId,
        reason: String,
    },

    #[error(
        "Patient {patient_id} already has active assignment {existing} of protocol {protocol_id}"
    )]
    AssignmentConflict {
        patient_id: PatientId,
        protocol_id: ProtocolId,
        existing: AssignmentId,
    },

    #[error(
        "Anchor date for assignment {assignment_id} moved back from {previous} to {requested}; \
         {stranded} instance(s) with recorded progress would be dropped"
    )]
    AnchorRegression {
        assignment_id: AssignmentId,
        previous: CalendarDate,
        requested: CalendarDate,
        stranded: usize,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all REGIMEN errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegimenError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl RegimenError {
    /// Persistence failures may be retried by the caller. Validation and
    /// conflict errors must be fixed upstream first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegimenError::Storage(_))
    }
}

/// Result type alias for REGIMEN operations.
pub type RegimenResult<T> = Result<T, RegimenError>;

// =============================================================================
// TESTS
// =============================================================================
