//! Instance Materializer
//!
//! Expands every task of a protocol template against an anchor date into
//! pending [`TaskInstanceDraft`]s. Nothing is persisted here.

use crate::recovery_day::recovery_day;
use crate::recurrence::expand_task;
use regimen_core::{
    CalendarDate, PatientId, ProtocolTemplate, RegimenResult, SchedulerConfig, TaskInstanceDraft,
    TaskStatus, TemplateTask, TenantId,
};

/// Materialize `template` for one patient.
///
/// Drafts are ordered by scheduled date, then by the task's position in the
/// template. Each draft snapshots the task's title, description and kind.
/// A template without tasks yields an empty list.
///
/// # Errors
/// Returns a validation error if the template or one of its recurrence
/// policies is invalid.
pub fn materialize(
    template: &ProtocolTemplate,
    anchor: CalendarDate,
    patient_id: PatientId,
    tenant_id: TenantId,
    config: &SchedulerConfig,
) -> RegimenResult<Vec<TaskInstanceDraft>> {
    template.validate()?;
    let horizon = config.horizon_for(template);

    let mut positioned = Vec::new();
    for (position, task) in template.tasks.iter().enumerate() {
        for scheduled_date in expand_task(anchor, task, horizon, config)? {
            let draft = draft_for(template, task, anchor, scheduled_date, patient_id, tenant_id);
            positioned.push((position, draft));
        }
    }

    positioned.sort_by_key(|(position, draft)| (draft.scheduled_date, *position));
    Ok(positioned.into_iter().map(|(_, draft)| draft).collect())
}

fn draft_for(
    template: &ProtocolTemplate,
    task: &TemplateTask,
    anchor: CalendarDate,
    scheduled_date: CalendarDate,
    patient_id: PatientId,
    tenant_id: TenantId,
) -> TaskInstanceDraft {
    TaskInstanceDraft {
        instance_id: None,
        tenant_id,
        patient_id,
        protocol_id: template.protocol_id,
        template_task_id: task.task_id,
        scheduled_date,
        recovery_day: recovery_day(anchor, scheduled_date),
        title: task.title.clone(),
        description: task.description.clone(),
        kind: task.kind,
        status: TaskStatus::Pending,
        completed_at: None,
        completion_payload: None,
    }
}
