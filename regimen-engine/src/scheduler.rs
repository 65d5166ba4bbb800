//! Protocol scheduler
//!
//! Facade over the persistence port that exposes the engine's operations.
//! Every trigger (initial assignment, protocol edit, anchor correction,
//! reactivation) reaches the instance set through the same
//! prepare-then-commit resync path.

use crate::materialize::materialize;
use crate::recovery_day::{due_date, RecoveryPosition};
use crate::resync::{plan_resync, ResyncOptions, ResyncPlan, ResyncSummary};
use chrono::Utc;
use regimen_core::{
    AssignmentId, AssignmentStatus, CalendarDate, CompletionPayload, EntityIdType, EntityType,
    InstanceId, Patient, PatientId, ProtocolAssignment, ProtocolId, ProtocolTemplate,
    RegimenResult, ScheduleError, SchedulerConfig, StorageError, TaskInstance, TaskStatus,
};
use regimen_storage::StorageTrait;
use serde::{Deserialize, Serialize};

// ============================================================================
// REQUESTS AND OUTCOMES
// ============================================================================

/// Request to assign a protocol to a patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AssignProtocolRequest {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub patient_id: PatientId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub protocol_id: ProtocolId,
    /// Assignment date, used as the anchor while the patient has none.
    /// Defaults to today.
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date"))]
    pub anchor_date: Option<CalendarDate>,
    /// Complete an existing active assignment of the same protocol instead
    /// of failing with `AssignmentConflict`.
    #[serde(default)]
    pub replace_existing: bool,
}

impl AssignProtocolRequest {
    pub fn new(patient_id: PatientId, protocol_id: ProtocolId) -> Self {
        Self {
            patient_id,
            protocol_id,
            anchor_date: None,
            replace_existing: false,
        }
    }

    pub fn with_anchor_date(mut self, anchor_date: CalendarDate) -> Self {
        self.anchor_date = Some(anchor_date);
        self
    }

    pub fn replacing_existing(mut self) -> Self {
        self.replace_existing = true;
        self
    }
}

/// Result of `assign_protocol`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AssignmentOutcome {
    pub assignment: ProtocolAssignment,
    /// Instances persisted for the new assignment
    pub tasks_created: usize,
    pub summary: ResyncSummary,
    /// Prior assignment completed by this request, if any
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub replaced: Option<AssignmentId>,
}

/// Per-assignment result of a resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ResyncReport {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub patient_id: PatientId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub assignment_id: AssignmentId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date"))]
    pub anchor_date: CalendarDate,
    pub summary: ResyncSummary,
}

/// A resync that has been planned but not yet written.
#[derive(Debug)]
struct PreparedSync {
    assignment_id: AssignmentId,
    patient_id: PatientId,
    anchor: CalendarDate,
    plan: ResyncPlan,
}

/// Anchor used to materialize `assignment`: the patient's anchor date, or
/// the assignment date while the patient has none.
pub fn resolve_anchor(patient: &Patient, assignment: &ProtocolAssignment) -> CalendarDate {
    patient.anchor_date.unwrap_or(assignment.assigned_on)
}

// ============================================================================
// SCHEDULER
// ============================================================================

/// Protocol scheduling engine bound to a storage backend.
#[derive(Debug, Clone)]
pub struct ProtocolScheduler<S> {
    storage: S,
    config: SchedulerConfig,
}

impl<S: StorageTrait> ProtocolScheduler<S> {
    /// Create a scheduler.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` if the configuration is invalid.
    pub fn new(storage: S, config: SchedulerConfig) -> RegimenResult<Self> {
        config.validate()?;
        Ok(Self { storage, config })
    }

    /// Create a scheduler configured from the environment.
    pub fn from_env(storage: S) -> RegimenResult<Self> {
        Self::new(storage, SchedulerConfig::from_env())
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn load_template(&self, protocol_id: ProtocolId) -> RegimenResult<ProtocolTemplate> {
        self.storage
            .template_get(protocol_id)?
            .ok_or_else(|| ScheduleError::TemplateNotFound { protocol_id }.into())
    }

    fn load_patient(&self, patient_id: PatientId) -> RegimenResult<Patient> {
        self.storage
            .patient_get(patient_id)?
            .ok_or_else(|| ScheduleError::PatientNotFound { patient_id }.into())
    }

    /// Materialize and plan a resync for one assignment without writing.
    fn prepare(
        &self,
        template: &ProtocolTemplate,
        patient: &Patient,
        assignment: &ProtocolAssignment,
        carried: &[TaskInstance],
        options: ResyncOptions,
    ) -> RegimenResult<PreparedSync> {
        let anchor = resolve_anchor(patient, assignment);
        let fresh = materialize(
            template,
            anchor,
            patient.patient_id,
            patient.tenant_id,
            &self.config,
        )?;

        let mut existing = self
            .storage
            .instance_list(patient.patient_id, assignment.assignment_id)?;
        existing.extend_from_slice(carried);
        let plan = plan_resync(fresh, &existing);

        if let Some(previous) = assignment.anchor_date {
            if anchor < previous && !plan.stranded.is_empty() {
                if !options.allow_anchor_regression {
                    tracing::warn!(
                        assignment_id = %assignment.assignment_id,
                        previous = %previous,
                        requested = %anchor,
                        stranded = plan.stranded.len(),
                        "Refusing resync that would drop recorded progress"
                    );
                    return Err(ScheduleError::AnchorRegression {
                        assignment_id: assignment.assignment_id,
                        previous,
                        requested: anchor,
                        stranded: plan.stranded.len(),
                    }
                    .into());
                }
                tracing::warn!(
                    assignment_id = %assignment.assignment_id,
                    stranded = plan.stranded.len(),
                    "Anchor regression forced; dropping instances with recorded progress"
                );
            }
        }

        tracing::debug!(
            assignment_id = %assignment.assignment_id,
            anchor = %anchor,
            drafts = plan.drafts.len(),
            "Planned resync"
        );

        Ok(PreparedSync {
            assignment_id: assignment.assignment_id,
            patient_id: patient.patient_id,
            anchor,
            plan,
        })
    }

    /// Apply a prepared resync in one atomic replace.
    fn commit(&self, prepared: PreparedSync) -> RegimenResult<ResyncReport> {
        let PreparedSync {
            assignment_id,
            patient_id,
            anchor,
            plan,
        } = prepared;

        self.storage
            .instance_replace(patient_id, assignment_id, anchor, plan.drafts)?;

        let summary = plan.summary;
        tracing::info!(
            patient_id = %patient_id,
            assignment_id = %assignment_id,
            anchor = %anchor,
            created = summary.created,
            preserved = summary.preserved,
            removed = summary.removed,
            unchanged = summary.unchanged,
            "Resynced protocol assignment"
        );

        Ok(ResyncReport {
            patient_id,
            assignment_id,
            anchor_date: anchor,
            summary,
        })
    }

    // === Exposed operations ===

    /// Assign a protocol to a patient and materialize its instances.
    ///
    /// With `replace_existing`, a prior active assignment of the same
    /// protocol is marked completed and its recorded progress moves to the
    /// new assignment by logical key. Nothing is written unless the whole
    /// assignment, including its instance set, is stored.
    ///
    /// # Errors
    /// - `TemplateNotFound` if the protocol is missing or belongs to another tenant
    /// - `PatientNotFound` if the patient is missing
    /// - `InvalidRecurrencePolicy` / `InvalidTemplate` for a malformed template
    /// - `AssignmentConflict` if an active assignment exists and is not replaced
    /// - a storage error if a write fails
    pub fn assign_protocol(
        &self,
        request: &AssignProtocolRequest,
    ) -> RegimenResult<AssignmentOutcome> {
        let template = self.load_template(request.protocol_id)?;
        let patient = self.load_patient(request.patient_id)?;
        if template.tenant_id != patient.tenant_id {
            return Err(ScheduleError::TemplateNotFound {
                protocol_id: request.protocol_id,
            }
            .into());
        }

        let prior = self
            .storage
            .assignment_find_active(patient.patient_id, template.protocol_id)?;
        let carried = match &prior {
            Some(existing) if !request.replace_existing => {
                return Err(ScheduleError::AssignmentConflict {
                    patient_id: patient.patient_id,
                    protocol_id: template.protocol_id,
                    existing: existing.assignment_id,
                }
                .into());
            }
            Some(existing) => self
                .storage
                .instance_list(patient.patient_id, existing.assignment_id)?,
            None => Vec::new(),
        };

        let assigned_on = request
            .anchor_date
            .unwrap_or_else(|| Utc::now().date_naive());
        let assignment = ProtocolAssignment::new(
            patient.tenant_id,
            patient.patient_id,
            template.protocol_id,
            assigned_on,
        );

        // Plan before the first write so a bad template leaves nothing behind.
        let prepared = self.prepare(
            &template,
            &patient,
            &assignment,
            &carried,
            ResyncOptions::default(),
        )?;

        // Retiring the prior assignment, inserting the new one and writing
        // its instances is a single store write.
        let PreparedSync { anchor, plan, .. } = prepared;
        let summary = plan.summary;
        let persisted = self.storage.assignment_activate(
            &assignment,
            prior.as_ref().map(|p| p.assignment_id),
            anchor,
            plan.drafts,
        )?;

        let assignment = self
            .storage
            .assignment_get(assignment.assignment_id)?
            .unwrap_or(assignment);

        tracing::info!(
            patient_id = %patient.patient_id,
            protocol_id = %template.protocol_id,
            assignment_id = %assignment.assignment_id,
            anchor = %anchor,
            tasks_created = persisted.len(),
            preserved = summary.preserved,
            replaced = prior.is_some(),
            "Assigned protocol"
        );

        Ok(AssignmentOutcome {
            assignment,
            tasks_created: persisted.len(),
            summary,
            replaced: prior.map(|p| p.assignment_id),
        })
    }

    /// Re-materialize a patient's active assignment of `protocol_id`.
    pub fn resync_protocol(
        &self,
        patient_id: PatientId,
        protocol_id: ProtocolId,
    ) -> RegimenResult<ResyncSummary> {
        self.resync_protocol_with(patient_id, protocol_id, ResyncOptions::default())
    }

    /// Re-materialize with explicit options.
    ///
    /// Fails before mutating anything if the template, patient or active
    /// assignment is missing, or if the resync would be an anchor regression
    /// that `options` does not allow.
    pub fn resync_protocol_with(
        &self,
        patient_id: PatientId,
        protocol_id: ProtocolId,
        options: ResyncOptions,
    ) -> RegimenResult<ResyncSummary> {
        let template = self.load_template(protocol_id)?;
        let patient = self.load_patient(patient_id)?;
        let assignment = self
            .storage
            .assignment_find_active(patient_id, protocol_id)?
            .ok_or(ScheduleError::AssignmentNotFound {
                patient_id,
                protocol_id,
            })?;

        let prepared = self.prepare(&template, &patient, &assignment, &[], options)?;
        Ok(self.commit(prepared)?.summary)
    }

    /// Instances of the patient's active assignments that fall due on
    /// `reference_date`.
    pub fn get_due_instances(
        &self,
        patient_id: PatientId,
        reference_date: CalendarDate,
    ) -> RegimenResult<Vec<TaskInstance>> {
        let patient = self.load_patient(patient_id)?;
        let mut due = Vec::new();
        for assignment in self.storage.assignment_list_active_by_patient(patient_id)? {
            let anchor = assignment
                .anchor_date
                .unwrap_or_else(|| resolve_anchor(&patient, &assignment));
            let Some(date) = due_date(anchor, reference_date) else {
                continue;
            };
            due.extend(
                self.storage
                    .instance_list(patient_id, assignment.assignment_id)?
                    .into_iter()
                    .filter(|i| i.scheduled_date == date),
            );
        }
        Ok(due)
    }

    /// The patient's recovery day and phase on `reference_date`, or `None`
    /// while the patient has no anchor date.
    pub fn recovery_position(
        &self,
        patient_id: PatientId,
        reference_date: CalendarDate,
    ) -> RegimenResult<Option<RecoveryPosition>> {
        let patient = self.load_patient(patient_id)?;
        Ok(patient
            .anchor_date
            .map(|anchor| RecoveryPosition::at(anchor, reference_date)))
    }

    // === Triggers ===

    /// Correct the patient's anchor date and resync every active assignment.
    ///
    /// All assignments are planned against the new anchor before the patient
    /// record or any instance set is written.
    pub fn correct_anchor_date(
        &self,
        patient_id: PatientId,
        anchor_date: CalendarDate,
        options: ResyncOptions,
    ) -> RegimenResult<Vec<ResyncReport>> {
        let mut patient = self.load_patient(patient_id)?;
        let previous = patient.anchor_date;
        patient.anchor_date = Some(anchor_date);

        let assignments = self.storage.assignment_list_active_by_patient(patient_id)?;
        let mut prepared = Vec::with_capacity(assignments.len());
        for assignment in &assignments {
            let template = self.load_template(assignment.protocol_id)?;
            prepared.push(self.prepare(&template, &patient, assignment, &[], options)?);
        }

        self.storage
            .patient_update_anchor(patient_id, Some(anchor_date))?;
        tracing::info!(
            patient_id = %patient_id,
            previous = ?previous,
            anchor = %anchor_date,
            assignments = prepared.len(),
            "Corrected anchor date"
        );

        prepared.into_iter().map(|p| self.commit(p)).collect()
    }

    /// Resync every active assignment of a protocol after its content changed.
    ///
    /// Stops at the first failing assignment; assignments already resynced
    /// stay committed and a retry is safe.
    pub fn protocol_edited(
        &self,
        protocol_id: ProtocolId,
        options: ResyncOptions,
    ) -> RegimenResult<Vec<ResyncReport>> {
        let template = self.load_template(protocol_id)?;
        template.validate()?;

        let assignments = self.storage.assignment_list_active_by_protocol(protocol_id)?;
        let mut reports = Vec::with_capacity(assignments.len());
        for assignment in &assignments {
            let patient = self.load_patient(assignment.patient_id)?;
            let prepared = self.prepare(&template, &patient, assignment, &[], options)?;
            reports.push(self.commit(prepared)?);
        }

        tracing::info!(
            protocol_id = %protocol_id,
            assignments = reports.len(),
            "Resynced edited protocol"
        );
        Ok(reports)
    }

    /// Record progress on an instance on behalf of a completion recorder.
    pub fn record_completion(
        &self,
        instance_id: InstanceId,
        status: TaskStatus,
        payload: Option<CompletionPayload>,
    ) -> RegimenResult<TaskInstance> {
        let instance = self
            .storage
            .instance_update_status(instance_id, status, payload)?;
        tracing::info!(
            instance_id = %instance_id,
            patient_id = %instance.patient_id,
            status = %status,
            "Recorded instance progress"
        );
        Ok(instance)
    }

    /// Change an assignment's status. Reactivating an assignment resyncs it.
    pub fn set_assignment_status(
        &self,
        assignment_id: AssignmentId,
        status: AssignmentStatus,
    ) -> RegimenResult<ProtocolAssignment> {
        let current = self.storage.assignment_get(assignment_id)?.ok_or(
            StorageError::NotFound {
                entity_type: EntityType::Assignment,
                id: assignment_id.as_uuid(),
            },
        )?;

        self.storage.assignment_update_status(assignment_id, status)?;
        tracing::info!(
            assignment_id = %assignment_id,
            from = %current.status,
            to = %status,
            "Changed assignment status"
        );

        if status == AssignmentStatus::Active && !current.is_active() {
            self.resync_protocol(current.patient_id, current.protocol_id)?;
        }

        self.storage.assignment_get(assignment_id)?.ok_or_else(|| {
            StorageError::NotFound {
                entity_type: EntityType::Assignment,
                id: assignment_id.as_uuid(),
            }
            .into()
        })
    }
}
