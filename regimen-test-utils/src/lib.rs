//! REGIMEN Test Utilities
//!
//! Centralized test infrastructure for the REGIMEN workspace:
//! - Proptest generators for entity types
//! - Test fixtures for common scenarios
//! - Custom assertions for scheduling-specific validation

// Re-export mock storage from its source crate
pub use regimen_storage::{MockStorage, StorageTrait};

// Re-export core types for convenience
pub use regimen_core::{
    AssignmentStatus, CalendarDate, EntityType, IntervalType, LogicalKey, Patient,
    ProtocolAssignment, ProtocolTemplate, RecurrencePolicy, RegimenError, RegimenResult,
    ScheduleError, SchedulerConfig, StorageError, TaskInstance, TaskKind, TaskStatus,
    TemplateTask, Timestamp,
    // Strongly-typed entity IDs
    AssignmentId, EntityIdType, InstanceId, PatientId, ProtocolId, TemplateTaskId, TenantId,
};

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating REGIMEN entity types.

    use super::*;
    use proptest::prelude::*;

    // === Identity Type Generators ===

    /// Generate a random UUID (for generic ID generation).
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_tenant_id() -> impl Strategy<Value = TenantId> {
        arb_uuid().prop_map(TenantId::new)
    }

    pub fn arb_patient_id() -> impl Strategy<Value = PatientId> {
        arb_uuid().prop_map(PatientId::new)
    }

    pub fn arb_protocol_id() -> impl Strategy<Value = ProtocolId> {
        arb_uuid().prop_map(ProtocolId::new)
    }

    pub fn arb_template_task_id() -> impl Strategy<Value = TemplateTaskId> {
        arb_uuid().prop_map(TemplateTaskId::new)
    }

    /// Generate a calendar date between 2020 and 2030.
    pub fn arb_calendar_date() -> impl Strategy<Value = CalendarDate> {
        (0i64..3_650).prop_map(|offset| {
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default() + chrono::Duration::days(offset)
        })
    }

    // === Enum Generators ===

    pub fn arb_task_kind() -> impl Strategy<Value = TaskKind> {
        prop_oneof![
            Just(TaskKind::Exercise),
            Just(TaskKind::Form),
            Just(TaskKind::Education),
            Just(TaskKind::Video),
            Just(TaskKind::Assessment),
        ]
    }

    pub fn arb_task_status() -> impl Strategy<Value = TaskStatus> {
        prop_oneof![
            Just(TaskStatus::Pending),
            Just(TaskStatus::InProgress),
            Just(TaskStatus::Completed),
        ]
    }

    pub fn arb_interval_type() -> impl Strategy<Value = IntervalType> {
        prop_oneof![
            Just(IntervalType::Daily),
            Just(IntervalType::EveryOtherDay),
            Just(IntervalType::Weekly),
            Just(IntervalType::Biweekly),
            Just(IntervalType::Monthly),
            Just(IntervalType::Custom),
        ]
    }

    /// Generate a valid recurrence policy. Custom cadences get 1-45 days.
    pub fn arb_recurrence_policy() -> impl Strategy<Value = RecurrencePolicy> {
        prop_oneof![
            Just(RecurrencePolicy::OneTime),
            (arb_interval_type(), 1u32..45).prop_map(|(interval_type, days)| {
                match interval_type {
                    IntervalType::Custom => RecurrencePolicy::every(days),
                    other => RecurrencePolicy::repeating(other),
                }
            }),
        ]
    }

    // === Entity Generators ===

    /// Generate a template task with an offset in [-14, 120).
    pub fn arb_template_task() -> impl Strategy<Value = TemplateTask> {
        (
            arb_template_task_id(),
            "[A-Za-z ]{3,24}",
            arb_task_kind(),
            -14i32..120,
            arb_recurrence_policy(),
        )
            .prop_map(|(task_id, title, kind, day_offset, recurrence)| {
                let mut task = TemplateTask::new(title, kind, day_offset).with_recurrence(recurrence);
                task.task_id = task_id;
                task
            })
    }

    /// Generate a valid template with up to `max_tasks` tasks and a short
    /// horizon so expansions stay small.
    pub fn arb_template(
        tenant_id: TenantId,
        max_tasks: usize,
    ) -> impl Strategy<Value = ProtocolTemplate> {
        (
            arb_protocol_id(),
            prop::collection::vec(arb_template_task(), 0..=max_tasks),
            1u32..90,
        )
            .prop_map(move |(protocol_id, tasks, horizon)| {
                let mut template = ProtocolTemplate::new(tenant_id, "Generated protocol", "any")
                    .with_horizon_days(horizon);
                template.protocol_id = protocol_id;
                template.tasks = tasks;
                template
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    /// Shorthand for a calendar date. Panics on an invalid date.
    pub fn date(y: i32, m: u32, d: u32) -> CalendarDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid fixture date")
    }

    /// Surgery date used across fixtures.
    pub fn surgery_date() -> CalendarDate {
        date(2024, 1, 1)
    }

    /// Default scheduler configuration.
    pub fn default_config() -> SchedulerConfig {
        SchedulerConfig::default()
    }

    /// A knee replacement protocol with pre-operative, one-time and
    /// repeating tasks over a 42-day horizon.
    pub fn knee_replacement_template(tenant_id: TenantId) -> ProtocolTemplate {
        ProtocolTemplate::new(tenant_id, "Total Knee Replacement", "TKA")
            .with_task(TemplateTask::new("Pre-operative questionnaire", TaskKind::Form, -7))
            .with_task(
                TemplateTask::new("Ankle pumps and quad sets", TaskKind::Exercise, 1)
                    .with_recurrence(RecurrencePolicy::repeating(IntervalType::Daily)),
            )
            .with_task(
                TemplateTask::new("Pain check-in", TaskKind::Form, 2)
                    .with_description("Rate pain 0-10")
                    .with_recurrence(RecurrencePolicy::every(3)),
            )
            .with_task(
                TemplateTask::new("Range of motion assessment", TaskKind::Assessment, 7)
                    .with_recurrence(RecurrencePolicy::repeating(IntervalType::Weekly)),
            )
            .with_task(TemplateTask::new("Returning to driving", TaskKind::Education, 28))
            .with_horizon_days(42)
    }

    /// A single weekly task starting two days after the anchor, over 21 days.
    pub fn weekly_template(tenant_id: TenantId) -> ProtocolTemplate {
        ProtocolTemplate::new(tenant_id, "Weekly check", "general")
            .with_task(
                TemplateTask::new("Weekly check-in", TaskKind::Form, 2)
                    .with_recurrence(RecurrencePolicy::repeating(IntervalType::Weekly)),
            )
            .with_horizon_days(21)
    }

    /// A patient anchored on [`surgery_date`].
    pub fn anchored_patient(tenant_id: TenantId) -> Patient {
        Patient::new(tenant_id, Some(surgery_date()))
    }

    /// Storage seeded with `template` and a patient anchored on
    /// [`surgery_date`] in the template's tenant.
    pub fn seeded_storage(template: &ProtocolTemplate) -> (MockStorage, Patient) {
        let storage = MockStorage::new();
        let patient = anchored_patient(template.tenant_id);
        storage
            .template_insert(template)
            .expect("insert fixture template");
        storage
            .patient_insert(&patient)
            .expect("insert fixture patient");
        (storage, patient)
    }

    /// Completion payload as recorded by a chat check-in.
    pub fn pain_payload(score: u8) -> serde_json::Value {
        serde_json::json!({ "pain": score, "recorded_via": "chat" })
    }

    /// Current time, for fixtures that need a timestamp.
    pub fn now() -> Timestamp {
        Utc::now()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for REGIMEN-specific validation.

    use super::*;
    use std::collections::{BTreeSet, HashMap};

    /// Assert that a RegimenResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &RegimenResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a RegimenResult is Err.
    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &RegimenResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    /// Assert that a RegimenResult is a NotFound storage error.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &RegimenResult<T>, entity_type: EntityType) {
        match result {
            Err(RegimenError::Storage(StorageError::NotFound { entity_type: et, .. })) => {
                assert_eq!(*et, entity_type, "Wrong entity type in NotFound error");
            }
            other => panic!("Expected NotFound error for {:?}, got: {:?}", entity_type, other),
        }
    }

    /// Assert that a RegimenResult is a retryable persistence failure.
    #[track_caller]
    pub fn assert_persistence_failure<T: std::fmt::Debug>(result: &RegimenResult<T>) {
        match result {
            Err(e @ RegimenError::Storage(_)) => assert!(e.is_retryable()),
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_template_not_found<T: std::fmt::Debug>(result: &RegimenResult<T>) {
        match result {
            Err(RegimenError::Schedule(ScheduleError::TemplateNotFound { .. })) => {}
            other => panic!("Expected TemplateNotFound, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_patient_not_found<T: std::fmt::Debug>(result: &RegimenResult<T>) {
        match result {
            Err(RegimenError::Schedule(ScheduleError::PatientNotFound { .. })) => {}
            other => panic!("Expected PatientNotFound, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_assignment_conflict<T: std::fmt::Debug>(result: &RegimenResult<T>) {
        match result {
            Err(RegimenError::Schedule(ScheduleError::AssignmentConflict { .. })) => {}
            other => panic!("Expected AssignmentConflict, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_invalid_policy<T: std::fmt::Debug>(result: &RegimenResult<T>) {
        match result {
            Err(RegimenError::Schedule(ScheduleError::InvalidRecurrencePolicy { .. })) => {}
            other => panic!("Expected InvalidRecurrencePolicy, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_anchor_regression<T: std::fmt::Debug>(result: &RegimenResult<T>) {
        match result {
            Err(RegimenError::Schedule(ScheduleError::AnchorRegression { .. })) => {}
            other => panic!("Expected AnchorRegression, got: {:?}", other),
        }
    }

    /// Assert that no two instances share a logical key.
    #[track_caller]
    pub fn assert_unique_logical_keys(instances: &[TaskInstance]) {
        let keys: BTreeSet<LogicalKey> = instances.iter().map(|i| i.logical_key()).collect();
        assert_eq!(
            keys.len(),
            instances.len(),
            "Duplicate logical keys among {} instances",
            instances.len()
        );
    }

    /// Assert that the logical keys of `instances` are exactly `expected`.
    #[track_caller]
    pub fn assert_keys_match<'a>(
        instances: &[TaskInstance],
        expected: impl IntoIterator<Item = &'a LogicalKey>,
    ) {
        let actual: BTreeSet<LogicalKey> = instances.iter().map(|i| i.logical_key()).collect();
        let expected: BTreeSet<LogicalKey> = expected.into_iter().copied().collect();
        let stale: Vec<_> = actual.difference(&expected).collect();
        let missing: Vec<_> = expected.difference(&actual).collect();
        assert!(
            stale.is_empty() && missing.is_empty(),
            "Instance keys differ: stale={:?}, missing={:?}",
            stale,
            missing
        );
    }

    /// Assert that every instance of `before` carrying progress, whose key
    /// is still present in `after`, kept its status, timestamp and payload.
    #[track_caller]
    pub fn assert_progress_preserved(before: &[TaskInstance], after: &[TaskInstance]) {
        let after_by_key: HashMap<LogicalKey, &TaskInstance> =
            after.iter().map(|i| (i.logical_key(), i)).collect();
        for old in before.iter().filter(|i| i.status.has_progress()) {
            if let Some(new) = after_by_key.get(&old.logical_key()) {
                assert_eq!(new.status, old.status, "Status lost for {:?}", old.logical_key());
                assert_eq!(
                    new.completed_at,
                    old.completed_at,
                    "completed_at lost for {:?}",
                    old.logical_key()
                );
                assert_eq!(
                    new.completion_payload,
                    old.completion_payload,
                    "Payload lost for {:?}",
                    old.logical_key()
                );
            }
        }
    }

    /// Assert that two instance sets are identical apart from `updated_at`.
    #[track_caller]
    pub fn assert_same_instance_set(a: &[TaskInstance], b: &[TaskInstance]) {
        let strip = |set: &[TaskInstance]| -> Vec<TaskInstance> {
            let mut stripped: Vec<TaskInstance> = set
                .iter()
                .cloned()
                .map(|mut i| {
                    i.updated_at = i.created_at;
                    i
                })
                .collect();
            stripped.sort_by_key(|i| i.logical_key());
            stripped
        };
        assert_eq!(strip(a), strip(b), "Instance sets differ");
    }
}

// ============================================================================
// TESTS
// ============================================================================
