//! Core entity structures

use crate::{
    AssignmentId, AssignmentStatus, CalendarDate, EntityIdType, InstanceId, IntervalType,
    PatientId, ProtocolId, RegimenResult, ScheduleError, TaskKind, TaskStatus, TemplateTaskId,
    TenantId, Timestamp,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Free-form completion data recorded by chat, UI or API clients.
/// The engine copies it during resync and never inspects it.
pub type CompletionPayload = serde_json::Value;

// ============================================================================
// PROTOCOL TEMPLATES
// ============================================================================

/// How often a template task recurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum RecurrencePolicy {
    /// Exactly one occurrence at the task's offset
    OneTime,
    /// Repeats from the task's offset until the scheduling horizon
    Repeating {
        interval_type: IntervalType,
        /// Required (>= 1) for `Custom`, ignored otherwise
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interval_days: Option<u32>,
    },
}

impl RecurrencePolicy {
    /// Shorthand for a repeating policy with a fixed cadence.
    pub fn repeating(interval_type: IntervalType) -> Self {
        RecurrencePolicy::Repeating {
            interval_type,
            interval_days: None,
        }
    }

    /// Shorthand for a custom cadence of `interval_days`.
    pub fn every(interval_days: u32) -> Self {
        RecurrencePolicy::Repeating {
            interval_type: IntervalType::Custom,
            interval_days: Some(interval_days),
        }
    }

    /// Check the policy invariant for the task that owns it.
    pub fn validate(&self, task_id: TemplateTaskId) -> RegimenResult<()> {
        if let RecurrencePolicy::Repeating {
            interval_type: IntervalType::Custom,
            interval_days,
        } = self
        {
            match interval_days {
                None => {
                    return Err(ScheduleError::InvalidRecurrencePolicy {
                        task_id,
                        reason: "custom interval requires interval_days".to_string(),
                    }
                    .into())
                }
                Some(0) => {
                    return Err(ScheduleError::InvalidRecurrencePolicy {
                        task_id,
                        reason: "interval_days must be at least 1".to_string(),
                    }
                    .into())
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// One task inside a protocol template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TemplateTask {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub task_id: TemplateTaskId,
    pub title: String,
    pub description: Option<String>,
    pub kind: TaskKind,
    /// Days relative to the anchor date; negative values are pre-anchor tasks.
    pub day_offset: i32,
    pub recurrence: RecurrencePolicy,
}

impl TemplateTask {
    /// Create a one-time task.
    pub fn new(title: impl Into<String>, kind: TaskKind, day_offset: i32) -> Self {
        Self {
            task_id: TemplateTaskId::now_v7(),
            title: title.into(),
            description: None,
            kind,
            day_offset,
            recurrence: RecurrencePolicy::OneTime,
        }
    }

    /// Set the recurrence policy.
    pub fn with_recurrence(mut self, recurrence: RecurrencePolicy) -> Self {
        self.recurrence = recurrence;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Reusable, tenant-authored definition of a care pathway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProtocolTemplate {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub protocol_id: ProtocolId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub tenant_id: TenantId,
    pub title: String,
    /// Target condition or surgery type
    pub condition: String,
    /// Ordered task list
    pub tasks: Vec<TemplateTask>,
    /// Per-protocol override of the scheduling horizon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizon_days: Option<u32>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl ProtocolTemplate {
    /// Create an empty template.
    pub fn new(tenant_id: TenantId, title: impl Into<String>, condition: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            protocol_id: ProtocolId::now_v7(),
            tenant_id,
            title: title.into(),
            condition: condition.into(),
            tasks: Vec::new(),
            horizon_days: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a task.
    pub fn with_task(mut self, task: TemplateTask) -> Self {
        self.tasks.push(task);
        self
    }

    /// Override the scheduling horizon for this protocol.
    pub fn with_horizon_days(mut self, horizon_days: u32) -> Self {
        self.horizon_days = Some(horizon_days);
        self
    }

    /// Look up a task by id.
    pub fn task(&self, task_id: TemplateTaskId) -> Option<&TemplateTask> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    /// Validate the template: unique task ids, valid policies, positive horizon override.
    pub fn validate(&self) -> RegimenResult<()> {
        if self.horizon_days == Some(0) {
            return Err(ScheduleError::InvalidTemplate {
                protocol_id: self.protocol_id,
                reason: "horizon_days override must be positive".to_string(),
            }
            .into());
        }

        let mut seen = HashSet::with_capacity(self.tasks.len());
        for task in &self.tasks {
            if !seen.insert(task.task_id) {
                return Err(ScheduleError::InvalidTemplate {
                    protocol_id: self.protocol_id,
                    reason: format!("duplicate task id {}", task.task_id),
                }
                .into());
            }
            task.recurrence.validate(task.task_id)?;
        }
        Ok(())
    }
}

// ============================================================================
// PATIENTS AND ASSIGNMENTS
// ============================================================================

/// Patient anchor context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Patient {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub patient_id: PatientId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub tenant_id: TenantId,
    /// Surgery date; may be past, present or future, and may be corrected later.
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date"))]
    pub anchor_date: Option<CalendarDate>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl Patient {
    pub fn new(tenant_id: TenantId, anchor_date: Option<CalendarDate>) -> Self {
        let now = Utc::now();
        Self {
            patient_id: PatientId::now_v7(),
            tenant_id,
            anchor_date,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Link between a patient and a protocol template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProtocolAssignment {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub assignment_id: AssignmentId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub tenant_id: TenantId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub patient_id: PatientId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub protocol_id: ProtocolId,
    pub status: AssignmentStatus,
    /// Default anchor when the patient has none.
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date"))]
    pub assigned_on: CalendarDate,
    /// Anchor used by the most recent materialization.
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date"))]
    pub anchor_date: Option<CalendarDate>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl ProtocolAssignment {
    /// Create a new active assignment.
    pub fn new(
        tenant_id: TenantId,
        patient_id: PatientId,
        protocol_id: ProtocolId,
        assigned_on: CalendarDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            assignment_id: AssignmentId::now_v7(),
            tenant_id,
            patient_id,
            protocol_id,
            status: AssignmentStatus::Active,
            assigned_on,
            anchor_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }
}

// ============================================================================
// TASK INSTANCES
// ============================================================================

/// Identity of a schedulable unit across resyncs. Unique per patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LogicalKey {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub template_task_id: TemplateTaskId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date"))]
    pub scheduled_date: CalendarDate,
}

impl LogicalKey {
    pub fn new(template_task_id: TemplateTaskId, scheduled_date: CalendarDate) -> Self {
        Self {
            template_task_id,
            scheduled_date,
        }
    }
}

/// A materialized instance that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TaskInstanceDraft {
    /// Existing instance id to keep, if this draft replaces a known instance.
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub instance_id: Option<InstanceId>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub tenant_id: TenantId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub patient_id: PatientId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub protocol_id: ProtocolId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub template_task_id: TemplateTaskId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date"))]
    pub scheduled_date: CalendarDate,
    /// Signed day count from the anchor date to `scheduled_date`.
    pub recovery_day: i64,
    // Snapshot of template content at materialization time.
    pub title: String,
    pub description: Option<String>,
    pub kind: TaskKind,
    pub status: TaskStatus,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub completed_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub completion_payload: Option<CompletionPayload>,
}

impl TaskInstanceDraft {
    pub fn logical_key(&self) -> LogicalKey {
        LogicalKey::new(self.template_task_id, self.scheduled_date)
    }

    /// Persist this draft as an instance of `assignment_id`.
    /// Keeps the carried instance id or mints a new one.
    pub fn into_instance(self, assignment_id: AssignmentId, now: Timestamp) -> TaskInstance {
        TaskInstance {
            instance_id: self.instance_id.unwrap_or_else(InstanceId::now_v7),
            tenant_id: self.tenant_id,
            patient_id: self.patient_id,
            assignment_id,
            protocol_id: self.protocol_id,
            template_task_id: self.template_task_id,
            scheduled_date: self.scheduled_date,
            recovery_day: self.recovery_day,
            title: self.title,
            description: self.description,
            kind: self.kind,
            status: self.status,
            completed_at: self.completed_at,
            completion_payload: self.completion_payload,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A persisted, independently completable task for one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TaskInstance {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub instance_id: InstanceId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub tenant_id: TenantId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub patient_id: PatientId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub assignment_id: AssignmentId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub protocol_id: ProtocolId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub template_task_id: TemplateTaskId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date"))]
    pub scheduled_date: CalendarDate,
    pub recovery_day: i64,
    pub title: String,
    pub description: Option<String>,
    pub kind: TaskKind,
    pub status: TaskStatus,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub completed_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub completion_payload: Option<CompletionPayload>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl TaskInstance {
    pub fn logical_key(&self) -> LogicalKey {
        LogicalKey::new(self.template_task_id, self.scheduled_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RegimenError, TenantId};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> CalendarDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_custom_policy_requires_interval_days() {
        let task_id = TemplateTaskId::now_v7();
        let missing = RecurrencePolicy::Repeating {
            interval_type: IntervalType::Custom,
            interval_days: None,
        };
        assert!(matches!(
            missing.validate(task_id),
            Err(RegimenError::Schedule(ScheduleError::InvalidRecurrencePolicy { .. }))
        ));
        assert!(RecurrencePolicy::every(0).validate(task_id).is_err());
        assert!(RecurrencePolicy::every(3).validate(task_id).is_ok());
    }

    #[test]
    fn test_interval_days_ignored_for_fixed_cadence() {
        let policy = RecurrencePolicy::Repeating {
            interval_type: IntervalType::Weekly,
            interval_days: Some(0),
        };
        assert!(policy.validate(TemplateTaskId::now_v7()).is_ok());
    }

    #[test]
    fn test_policy_serde_shape() {
        let json = serde_json::to_value(RecurrencePolicy::every(3)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "repeating", "interval_type": "custom", "interval_days": 3})
        );
        let one_time: RecurrencePolicy =
            serde_json::from_value(serde_json::json!({"type": "one_time"})).unwrap();
        assert_eq!(one_time, RecurrencePolicy::OneTime);
    }

    #[test]
    fn test_template_rejects_duplicate_task_ids() {
        let task = TemplateTask::new("Ankle pumps", TaskKind::Exercise, 0);
        let template = ProtocolTemplate::new(TenantId::now_v7(), "Knee", "TKA")
            .with_task(task.clone())
            .with_task(task);
        assert!(matches!(
            template.validate(),
            Err(RegimenError::Schedule(ScheduleError::InvalidTemplate { .. }))
        ));
    }

    #[test]
    fn test_template_rejects_zero_horizon_override() {
        let template =
            ProtocolTemplate::new(TenantId::now_v7(), "Hip", "THA").with_horizon_days(0);
        assert!(template.validate().is_err());
    }

    #[test]
    fn test_draft_into_instance_keeps_carried_id() {
        let carried = InstanceId::now_v7();
        let draft = TaskInstanceDraft {
            instance_id: Some(carried),
            tenant_id: TenantId::now_v7(),
            patient_id: PatientId::now_v7(),
            protocol_id: ProtocolId::now_v7(),
            template_task_id: TemplateTaskId::now_v7(),
            scheduled_date: date(2024, 1, 3),
            recovery_day: 2,
            title: "Walk".to_string(),
            description: None,
            kind: TaskKind::Exercise,
            status: TaskStatus::Pending,
            completed_at: None,
            completion_payload: None,
        };
        let key = draft.logical_key();
        let instance = draft.into_instance(AssignmentId::now_v7(), Utc::now());
        assert_eq!(instance.instance_id, carried);
        assert_eq!(instance.logical_key(), key);
    }

    #[cfg(feature = "openapi")]
    #[test]
    fn test_calendar_dates_publish_as_date_strings() {
        use utoipa::PartialSchema;

        let instance = serde_json::to_value(TaskInstance::schema()).unwrap();
        assert_eq!(instance["properties"]["scheduled_date"]["type"], "string");
        assert_eq!(instance["properties"]["scheduled_date"]["format"], "date");

        let assignment = serde_json::to_value(ProtocolAssignment::schema()).unwrap();
        assert_eq!(assignment["properties"]["assigned_on"]["format"], "date");
        assert_eq!(assignment["properties"]["anchor_date"]["format"], "date");
    }
}
