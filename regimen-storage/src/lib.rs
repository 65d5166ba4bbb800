//! REGIMEN Storage - Persistence Port and In-Memory Implementation
//!
//! Defines the narrow set of store operations the scheduling engine needs.
//! Real database adapters implement [`StorageTrait`] outside this workspace;
//! [`MockStorage`] is the in-memory reference implementation used by tests
//! and the preview tooling.

use chrono::Utc;
use regimen_core::{
    AssignmentId, AssignmentStatus, CalendarDate, CompletionPayload, EntityIdType, EntityType,
    InstanceId, LogicalKey, Patient, PatientId, ProtocolAssignment, ProtocolId, ProtocolTemplate,
    RegimenError, RegimenResult, ScheduleError, StorageError, TaskInstance, TaskInstanceDraft,
    TaskStatus, Timestamp,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

// ============================================================================
// STORAGE TRAIT
// ============================================================================

/// Persistence port for the scheduling engine.
///
/// `instance_replace` is the only multi-row write and must be atomic: a
/// concurrent reader observes either the previous instance set of the
/// assignment or the new one, never a partial or empty intermediate.
pub trait StorageTrait: Send + Sync {
    // === Protocol Templates ===

    /// Insert a new protocol template.
    fn template_insert(&self, t: &ProtocolTemplate) -> RegimenResult<()>;

    /// Replace a protocol template in place (templates are mutable).
    fn template_update(&self, t: &ProtocolTemplate) -> RegimenResult<()>;

    /// Fetch a protocol template by ID.
    fn template_get(&self, id: ProtocolId) -> RegimenResult<Option<ProtocolTemplate>>;

    // === Patients ===

    /// Insert a new patient.
    fn patient_insert(&self, p: &Patient) -> RegimenResult<()>;

    /// Get a patient by ID.
    fn patient_get(&self, id: PatientId) -> RegimenResult<Option<Patient>>;

    /// Set or clear the patient's anchor date.
    fn patient_update_anchor(
        &self,
        id: PatientId,
        anchor_date: Option<CalendarDate>,
    ) -> RegimenResult<()>;

    // === Protocol Assignments ===

    /// Insert an assignment. Fails with `AssignmentConflict` if it is active
    /// and the patient already has an active assignment of the same protocol.
    fn assignment_insert(&self, a: &ProtocolAssignment) -> RegimenResult<()>;

    /// Get an assignment by ID.
    fn assignment_get(&self, id: AssignmentId) -> RegimenResult<Option<ProtocolAssignment>>;

    /// Find the active assignment of `protocol_id` for `patient_id`.
    fn assignment_find_active(
        &self,
        patient_id: PatientId,
        protocol_id: ProtocolId,
    ) -> RegimenResult<Option<ProtocolAssignment>>;

    /// List a patient's active assignments.
    fn assignment_list_active_by_patient(
        &self,
        patient_id: PatientId,
    ) -> RegimenResult<Vec<ProtocolAssignment>>;

    /// List every active assignment of a protocol.
    fn assignment_list_active_by_protocol(
        &self,
        protocol_id: ProtocolId,
    ) -> RegimenResult<Vec<ProtocolAssignment>>;

    /// Change an assignment's status. Reactivating is subject to the same
    /// uniqueness rule as insert.
    fn assignment_update_status(
        &self,
        id: AssignmentId,
        status: AssignmentStatus,
    ) -> RegimenResult<()>;

    /// Insert an active assignment together with its materialized instances
    /// and record `anchor_date` on it, in one atomic write.
    ///
    /// When `retire` names a prior assignment of the same patient and
    /// protocol, it is marked completed and its instance set is cleared in
    /// the same write, so carried instance ids live under exactly one
    /// assignment. On error nothing is changed.
    fn assignment_activate(
        &self,
        assignment: &ProtocolAssignment,
        retire: Option<AssignmentId>,
        anchor_date: CalendarDate,
        drafts: Vec<TaskInstanceDraft>,
    ) -> RegimenResult<Vec<TaskInstance>>;

    // === Task Instances ===

    /// List the instances of one assignment for a patient.
    fn instance_list(
        &self,
        patient_id: PatientId,
        assignment_id: AssignmentId,
    ) -> RegimenResult<Vec<TaskInstance>>;

    /// List every instance of a patient across assignments.
    fn instance_list_by_patient(&self, patient_id: PatientId) -> RegimenResult<Vec<TaskInstance>>;

    /// Get an instance by ID.
    fn instance_get(&self, id: InstanceId) -> RegimenResult<Option<TaskInstance>>;

    /// Atomically replace the instance set of an assignment with `drafts`
    /// and record `anchor_date` as the anchor they were materialized from.
    fn instance_replace(
        &self,
        patient_id: PatientId,
        assignment_id: AssignmentId,
        anchor_date: CalendarDate,
        drafts: Vec<TaskInstanceDraft>,
    ) -> RegimenResult<Vec<TaskInstance>>;

    /// Record progress on an instance. `Completed` stamps `completed_at`;
    /// `Pending` clears both the timestamp and the payload.
    fn instance_update_status(
        &self,
        id: InstanceId,
        status: TaskStatus,
        payload: Option<CompletionPayload>,
    ) -> RegimenResult<TaskInstance>;
}

// ============================================================================
// MOCK STORAGE
// ============================================================================

#[derive(Debug, Default)]
struct StoreState {
    templates: HashMap<ProtocolId, ProtocolTemplate>,
    patients: HashMap<PatientId, Patient>,
    assignments: HashMap<AssignmentId, ProtocolAssignment>,
    instances: HashMap<AssignmentId, Vec<TaskInstance>>,
    fail_next_replace: Option<String>,
}

impl StoreState {
    fn active_assignment(
        &self,
        patient_id: PatientId,
        protocol_id: ProtocolId,
    ) -> Option<&ProtocolAssignment> {
        self.assignments
            .values()
            .filter(|a| a.patient_id == patient_id && a.protocol_id == protocol_id)
            .filter(|a| a.is_active())
            .min_by_key(|a| a.created_at)
    }

    fn take_injected_failure(&mut self) -> RegimenResult<()> {
        match self.fail_next_replace.take() {
            Some(reason) => Err(RegimenError::Storage(StorageError::TransactionFailed {
                reason,
            })),
            None => Ok(()),
        }
    }

    fn created_at_index(&self, assignment_id: AssignmentId) -> HashMap<InstanceId, Timestamp> {
        self.instances
            .get(&assignment_id)
            .map(|old| old.iter().map(|i| (i.instance_id, i.created_at)).collect())
            .unwrap_or_default()
    }
}

/// Reject drafts for another patient and duplicate logical keys.
fn check_drafts(patient_id: PatientId, drafts: &[TaskInstanceDraft]) -> RegimenResult<()> {
    // Unique (template_task_id, scheduled_date) per patient.
    let mut keys: HashSet<LogicalKey> = HashSet::with_capacity(drafts.len());
    for draft in drafts {
        if draft.patient_id != patient_id {
            return Err(RegimenError::Storage(StorageError::TransactionFailed {
                reason: format!("draft belongs to patient {}", draft.patient_id),
            }));
        }
        if !keys.insert(draft.logical_key()) {
            return Err(RegimenError::Storage(StorageError::UniqueViolation {
                entity_type: EntityType::Instance,
                constraint: format!(
                    "(template_task_id, scheduled_date) = ({}, {})",
                    draft.template_task_id, draft.scheduled_date
                ),
            }));
        }
    }
    Ok(())
}

/// Persist drafts under `assignment_id`, keeping `created_at` for carried ids.
fn build_instances(
    drafts: Vec<TaskInstanceDraft>,
    assignment_id: AssignmentId,
    previous_created: &HashMap<InstanceId, Timestamp>,
    now: Timestamp,
) -> Vec<TaskInstance> {
    drafts
        .into_iter()
        .map(|draft| {
            let mut instance = draft.into_instance(assignment_id, now);
            if let Some(created_at) = previous_created.get(&instance.instance_id) {
                instance.created_at = *created_at;
            }
            instance
        })
        .collect()
}

/// In-memory mock storage.
///
/// All state sits behind one lock, so every trait method is a single
/// critical section. Cloning shares the underlying state.
#[derive(Debug, Default, Clone)]
pub struct MockStorage {
    state: Arc<RwLock<StoreState>>,
}

impl MockStorage {
    /// Create a new mock storage.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RegimenResult<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| RegimenError::Storage(StorageError::LockPoisoned))
    }

    fn write(&self) -> RegimenResult<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|_| RegimenError::Storage(StorageError::LockPoisoned))
    }

    /// Make the next instance-set write (`instance_replace` or
    /// `assignment_activate`) fail with `TransactionFailed` without touching
    /// any state.
    pub fn fail_next_replace(&self, reason: impl Into<String>) -> RegimenResult<()> {
        self.write()?.fail_next_replace = Some(reason.into());
        Ok(())
    }

    /// Clear all stored data.
    pub fn clear(&self) -> RegimenResult<()> {
        *self.write()? = StoreState::default();
        Ok(())
    }

    /// Get count of stored templates.
    pub fn template_count(&self) -> RegimenResult<usize> {
        Ok(self.read()?.templates.len())
    }

    /// Get count of stored assignments.
    pub fn assignment_count(&self) -> RegimenResult<usize> {
        Ok(self.read()?.assignments.len())
    }

    /// Get count of stored instances across all assignments.
    pub fn instance_count(&self) -> RegimenResult<usize> {
        Ok(self.read()?.instances.values().map(Vec::len).sum())
    }
}

fn not_found(entity_type: EntityType, id: uuid::Uuid) -> RegimenError {
    RegimenError::Storage(StorageError::NotFound { entity_type, id })
}

impl StorageTrait for MockStorage {
    // === Protocol Templates ===

    fn template_insert(&self, t: &ProtocolTemplate) -> RegimenResult<()> {
        let mut state = self.write()?;
        if state.templates.contains_key(&t.protocol_id) {
            return Err(RegimenError::Storage(StorageError::InsertFailed {
                entity_type: EntityType::Protocol,
                reason: "already exists".to_string(),
            }));
        }
        state.templates.insert(t.protocol_id, t.clone());
        Ok(())
    }

    fn template_update(&self, t: &ProtocolTemplate) -> RegimenResult<()> {
        let mut state = self.write()?;
        let stored = state
            .templates
            .get_mut(&t.protocol_id)
            .ok_or_else(|| not_found(EntityType::Protocol, t.protocol_id.as_uuid()))?;
        *stored = t.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    fn template_get(&self, id: ProtocolId) -> RegimenResult<Option<ProtocolTemplate>> {
        Ok(self.read()?.templates.get(&id).cloned())
    }

    // === Patients ===

    fn patient_insert(&self, p: &Patient) -> RegimenResult<()> {
        let mut state = self.write()?;
        if state.patients.contains_key(&p.patient_id) {
            return Err(RegimenError::Storage(StorageError::InsertFailed {
                entity_type: EntityType::Patient,
                reason: "already exists".to_string(),
            }));
        }
        state.patients.insert(p.patient_id, p.clone());
        Ok(())
    }

    fn patient_get(&self, id: PatientId) -> RegimenResult<Option<Patient>> {
        Ok(self.read()?.patients.get(&id).cloned())
    }

    fn patient_update_anchor(
        &self,
        id: PatientId,
        anchor_date: Option<CalendarDate>,
    ) -> RegimenResult<()> {
        let mut state = self.write()?;
        let patient = state
            .patients
            .get_mut(&id)
            .ok_or_else(|| not_found(EntityType::Patient, id.as_uuid()))?;
        patient.anchor_date = anchor_date;
        patient.updated_at = Utc::now();
        Ok(())
    }

    // === Protocol Assignments ===

    fn assignment_insert(&self, a: &ProtocolAssignment) -> RegimenResult<()> {
        let mut state = self.write()?;
        if state.assignments.contains_key(&a.assignment_id) {
            return Err(RegimenError::Storage(StorageError::InsertFailed {
                entity_type: EntityType::Assignment,
                reason: "already exists".to_string(),
            }));
        }
        if a.is_active() {
            if let Some(existing) = state.active_assignment(a.patient_id, a.protocol_id) {
                return Err(RegimenError::Schedule(ScheduleError::AssignmentConflict {
                    patient_id: a.patient_id,
                    protocol_id: a.protocol_id,
                    existing: existing.assignment_id,
                }));
            }
        }
        state.assignments.insert(a.assignment_id, a.clone());
        Ok(())
    }

    fn assignment_get(&self, id: AssignmentId) -> RegimenResult<Option<ProtocolAssignment>> {
        Ok(self.read()?.assignments.get(&id).cloned())
    }

    fn assignment_find_active(
        &self,
        patient_id: PatientId,
        protocol_id: ProtocolId,
    ) -> RegimenResult<Option<ProtocolAssignment>> {
        Ok(self
            .read()?
            .active_assignment(patient_id, protocol_id)
            .cloned())
    }

    fn assignment_list_active_by_patient(
        &self,
        patient_id: PatientId,
    ) -> RegimenResult<Vec<ProtocolAssignment>> {
        let state = self.read()?;
        let mut assignments: Vec<_> = state
            .assignments
            .values()
            .filter(|a| a.patient_id == patient_id && a.is_active())
            .cloned()
            .collect();
        assignments.sort_by_key(|a| a.assignment_id);
        Ok(assignments)
    }

    fn assignment_list_active_by_protocol(
        &self,
        protocol_id: ProtocolId,
    ) -> RegimenResult<Vec<ProtocolAssignment>> {
        let state = self.read()?;
        let mut assignments: Vec<_> = state
            .assignments
            .values()
            .filter(|a| a.protocol_id == protocol_id && a.is_active())
            .cloned()
            .collect();
        assignments.sort_by_key(|a| a.assignment_id);
        Ok(assignments)
    }

    fn assignment_update_status(
        &self,
        id: AssignmentId,
        status: AssignmentStatus,
    ) -> RegimenResult<()> {
        let mut state = self.write()?;
        let current = state
            .assignments
            .get(&id)
            .ok_or_else(|| not_found(EntityType::Assignment, id.as_uuid()))?;

        if status == AssignmentStatus::Active && !current.is_active() {
            if let Some(existing) = state.active_assignment(current.patient_id, current.protocol_id)
            {
                return Err(RegimenError::Schedule(ScheduleError::AssignmentConflict {
                    patient_id: current.patient_id,
                    protocol_id: current.protocol_id,
                    existing: existing.assignment_id,
                }));
            }
        }

        if let Some(assignment) = state.assignments.get_mut(&id) {
            assignment.status = status;
            assignment.updated_at = Utc::now();
        }
        Ok(())
    }

    fn assignment_activate(
        &self,
        assignment: &ProtocolAssignment,
        retire: Option<AssignmentId>,
        anchor_date: CalendarDate,
        drafts: Vec<TaskInstanceDraft>,
    ) -> RegimenResult<Vec<TaskInstance>> {
        let mut state = self.write()?;
        state.take_injected_failure()?;

        let assignment_id = assignment.assignment_id;
        if state.assignments.contains_key(&assignment_id) {
            return Err(RegimenError::Storage(StorageError::InsertFailed {
                entity_type: EntityType::Assignment,
                reason: "already exists".to_string(),
            }));
        }
        if !assignment.is_active() {
            return Err(RegimenError::Storage(StorageError::InsertFailed {
                entity_type: EntityType::Assignment,
                reason: format!("cannot activate assignment in status {}", assignment.status),
            }));
        }
        if let Some(prior_id) = retire {
            let prior = state
                .assignments
                .get(&prior_id)
                .ok_or_else(|| not_found(EntityType::Assignment, prior_id.as_uuid()))?;
            if prior.patient_id != assignment.patient_id
                || prior.protocol_id != assignment.protocol_id
            {
                return Err(RegimenError::Storage(StorageError::TransactionFailed {
                    reason: format!(
                        "assignment {} is not an assignment of protocol {} for patient {}",
                        prior_id, assignment.protocol_id, assignment.patient_id
                    ),
                }));
            }
        }
        if let Some(existing) = state.active_assignment(assignment.patient_id, assignment.protocol_id)
        {
            if retire != Some(existing.assignment_id) {
                return Err(RegimenError::Schedule(ScheduleError::AssignmentConflict {
                    patient_id: assignment.patient_id,
                    protocol_id: assignment.protocol_id,
                    existing: existing.assignment_id,
                }));
            }
        }
        check_drafts(assignment.patient_id, &drafts)?;

        let now = Utc::now();
        let previous_created = retire
            .map(|prior_id| state.created_at_index(prior_id))
            .unwrap_or_default();
        let instances = build_instances(drafts, assignment_id, &previous_created, now);

        if let Some(prior_id) = retire {
            state.instances.remove(&prior_id);
            if let Some(prior) = state.assignments.get_mut(&prior_id) {
                prior.status = AssignmentStatus::Completed;
                prior.updated_at = now;
            }
        }
        let mut activated = assignment.clone();
        activated.anchor_date = Some(anchor_date);
        activated.updated_at = now;
        state.assignments.insert(assignment_id, activated);
        state.instances.insert(assignment_id, instances.clone());
        Ok(instances)
    }

    // === Task Instances ===

    fn instance_list(
        &self,
        patient_id: PatientId,
        assignment_id: AssignmentId,
    ) -> RegimenResult<Vec<TaskInstance>> {
        let state = self.read()?;
        Ok(state
            .instances
            .get(&assignment_id)
            .map(|instances| {
                instances
                    .iter()
                    .filter(|i| i.patient_id == patient_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn instance_list_by_patient(&self, patient_id: PatientId) -> RegimenResult<Vec<TaskInstance>> {
        let state = self.read()?;
        let mut instances: Vec<_> = state
            .instances
            .values()
            .flatten()
            .filter(|i| i.patient_id == patient_id)
            .cloned()
            .collect();
        instances.sort_by_key(|i| (i.scheduled_date, i.assignment_id, i.instance_id));
        Ok(instances)
    }

    fn instance_get(&self, id: InstanceId) -> RegimenResult<Option<TaskInstance>> {
        let state = self.read()?;
        Ok(state
            .instances
            .values()
            .flatten()
            .find(|i| i.instance_id == id)
            .cloned())
    }

    fn instance_replace(
        &self,
        patient_id: PatientId,
        assignment_id: AssignmentId,
        anchor_date: CalendarDate,
        drafts: Vec<TaskInstanceDraft>,
    ) -> RegimenResult<Vec<TaskInstance>> {
        let mut state = self.write()?;
        state.take_injected_failure()?;

        let assignment = state
            .assignments
            .get(&assignment_id)
            .ok_or_else(|| not_found(EntityType::Assignment, assignment_id.as_uuid()))?;
        if assignment.patient_id != patient_id {
            return Err(RegimenError::Storage(StorageError::TransactionFailed {
                reason: format!(
                    "assignment {} does not belong to patient {}",
                    assignment_id, patient_id
                ),
            }));
        }
        check_drafts(patient_id, &drafts)?;

        let now = Utc::now();
        let previous_created = state.created_at_index(assignment_id);
        let replacement = build_instances(drafts, assignment_id, &previous_created, now);

        state.instances.insert(assignment_id, replacement.clone());
        if let Some(assignment) = state.assignments.get_mut(&assignment_id) {
            assignment.anchor_date = Some(anchor_date);
            assignment.updated_at = now;
        }
        Ok(replacement)
    }

    fn instance_update_status(
        &self,
        id: InstanceId,
        status: TaskStatus,
        payload: Option<CompletionPayload>,
    ) -> RegimenResult<TaskInstance> {
        let mut state = self.write()?;
        let instance = state
            .instances
            .values_mut()
            .flatten()
            .find(|i| i.instance_id == id)
            .ok_or_else(|| not_found(EntityType::Instance, id.as_uuid()))?;

        let now = Utc::now();
        match status {
            TaskStatus::Completed => {
                instance.completed_at = Some(instance.completed_at.unwrap_or(now));
            }
            TaskStatus::InProgress => instance.completed_at = None,
            TaskStatus::Pending => {
                instance.completed_at = None;
                instance.completion_payload = None;
            }
        }
        if status != TaskStatus::Pending {
            if let Some(payload) = payload {
                instance.completion_payload = Some(payload);
            }
        }
        instance.status = status;
        instance.updated_at = now;
        Ok(instance.clone())
    }
}

// ============================================================================
// TESTS
// ============================================================================
