//! State-Preserving Resync
//!
//! Merges freshly materialized drafts with the instances already stored for
//! an assignment. Progress recorded on an existing instance is carried onto
//! the draft with the same logical key, and matched drafts keep the existing
//! instance id. Planning is pure; the scheduler applies the plan through the
//! persistence port in one atomic replace.

use regimen_core::{LogicalKey, TaskInstance, TaskInstanceDraft};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Counts reported by a resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ResyncSummary {
    /// Drafts with no existing instance
    pub created: usize,
    /// Existing instances whose recorded progress was carried forward
    pub preserved: usize,
    /// Existing instances with no counterpart in the fresh schedule
    pub removed: usize,
    /// Existing pending instances kept as-is
    pub unchanged: usize,
}

impl ResyncSummary {
    /// Total instances after the resync.
    pub fn total(&self) -> usize {
        self.created + self.preserved + self.unchanged
    }

    /// True if the resync neither added nor dropped any instance.
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.removed == 0
    }
}

/// Caller-controlled resync behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ResyncOptions {
    /// Apply the resync even when moving the anchor backward drops
    /// instances that already carry progress.
    #[serde(default)]
    pub allow_anchor_regression: bool,
}

impl ResyncOptions {
    /// Options that force a resync through an anchor regression.
    pub fn allowing_anchor_regression() -> Self {
        Self {
            allow_anchor_regression: true,
        }
    }
}

/// Result of merging fresh drafts with existing instances.
#[derive(Debug, Clone, PartialEq)]
pub struct ResyncPlan {
    /// Merged drafts, in materialization order
    pub drafts: Vec<TaskInstanceDraft>,
    pub summary: ResyncSummary,
    /// Removed instances that carried progress
    pub stranded: Vec<TaskInstance>,
}

/// Merge `fresh` drafts with `existing` instances.
///
/// For every draft whose logical key matches an existing instance, the
/// instance id is reused; if that instance has progress (`in_progress` or
/// `completed`), its status, completion timestamp and payload are copied
/// onto the draft. Existing instances whose key is absent from `fresh` are
/// counted as removed.
pub fn plan_resync(fresh: Vec<TaskInstanceDraft>, existing: &[TaskInstance]) -> ResyncPlan {
    let by_key: HashMap<LogicalKey, &TaskInstance> =
        existing.iter().map(|i| (i.logical_key(), i)).collect();

    let mut summary = ResyncSummary::default();
    let mut fresh_keys = HashSet::with_capacity(fresh.len());

    let drafts: Vec<TaskInstanceDraft> = fresh
        .into_iter()
        .map(|mut draft| {
            let key = draft.logical_key();
            fresh_keys.insert(key);
            match by_key.get(&key) {
                Some(current) => {
                    draft.instance_id = Some(current.instance_id);
                    if current.status.has_progress() {
                        draft.status = current.status;
                        draft.completed_at = current.completed_at;
                        draft.completion_payload = current.completion_payload.clone();
                        summary.preserved += 1;
                    } else {
                        summary.unchanged += 1;
                    }
                }
                None => summary.created += 1,
            }
            draft
        })
        .collect();

    let mut stranded = Vec::new();
    for (key, instance) in &by_key {
        if fresh_keys.contains(key) {
            continue;
        }
        summary.removed += 1;
        if instance.status.has_progress() {
            stranded.push((*instance).clone());
        }
    }
    stranded.sort_by_key(|i| i.logical_key());

    ResyncPlan {
        drafts,
        summary,
        stranded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use regimen_core::{
        AssignmentId, CalendarDate, EntityIdType, PatientId, ProtocolId, TaskKind, TaskStatus,
        TemplateTaskId, TenantId,
    };

    fn date(y: i32, m: u32, d: u32) -> CalendarDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn draft(task: TemplateTaskId, scheduled_date: CalendarDate) -> TaskInstanceDraft {
        TaskInstanceDraft {
            instance_id: None,
            tenant_id: TenantId::nil(),
            patient_id: PatientId::nil(),
            protocol_id: ProtocolId::nil(),
            template_task_id: task,
            scheduled_date,
            recovery_day: 0,
            title: "Quad sets".to_string(),
            description: None,
            kind: TaskKind::Exercise,
            status: TaskStatus::Pending,
            completed_at: None,
            completion_payload: None,
        }
    }

    fn stored(d: TaskInstanceDraft) -> TaskInstance {
        d.into_instance(AssignmentId::nil(), Utc::now())
    }

    #[test]
    fn test_first_sync_creates_everything() {
        let task = TemplateTaskId::now_v7();
        let fresh = vec![draft(task, date(2024, 1, 3)), draft(task, date(2024, 1, 10))];
        let plan = plan_resync(fresh, &[]);
        assert_eq!(
            plan.summary,
            ResyncSummary {
                created: 2,
                ..Default::default()
            }
        );
        assert!(plan.drafts.iter().all(|d| d.instance_id.is_none()));
    }

    #[test]
    fn test_completion_carried_by_logical_key() {
        let task = TemplateTaskId::now_v7();
        let mut done = stored(draft(task, date(2024, 1, 10)));
        done.status = TaskStatus::Completed;
        done.completed_at = Some(Utc::now());
        done.completion_payload = Some(serde_json::json!({"pain": 3}));
        let pending = stored(draft(task, date(2024, 1, 17)));

        let fresh = vec![draft(task, date(2024, 1, 10)), draft(task, date(2024, 1, 17))];
        let plan = plan_resync(fresh, &[done.clone(), pending.clone()]);

        assert_eq!(plan.summary.preserved, 1);
        assert_eq!(plan.summary.unchanged, 1);
        assert_eq!(plan.summary.created, 0);
        assert_eq!(plan.summary.removed, 0);

        let carried = &plan.drafts[0];
        assert_eq!(carried.instance_id, Some(done.instance_id));
        assert_eq!(carried.status, TaskStatus::Completed);
        assert_eq!(carried.completed_at, done.completed_at);
        assert_eq!(carried.completion_payload, Some(serde_json::json!({"pain": 3})));
        assert_eq!(plan.drafts[1].instance_id, Some(pending.instance_id));
    }

    #[test]
    fn test_in_progress_counts_as_progress() {
        let task = TemplateTaskId::now_v7();
        let mut started = stored(draft(task, date(2024, 1, 2)));
        started.status = TaskStatus::InProgress;
        let plan = plan_resync(vec![draft(task, date(2024, 1, 2))], &[started]);
        assert_eq!(plan.drafts[0].status, TaskStatus::InProgress);
        assert_eq!(plan.summary.preserved, 1);
    }

    #[test]
    fn test_dropped_keys_are_removed_and_progress_stranded() {
        let task = TemplateTaskId::now_v7();
        let mut done = stored(draft(task, date(2023, 12, 30)));
        done.status = TaskStatus::Completed;
        let stale = stored(draft(task, date(2023, 12, 31)));

        let plan = plan_resync(vec![draft(task, date(2024, 1, 2))], &[done.clone(), stale]);
        assert_eq!(plan.summary.created, 1);
        assert_eq!(plan.summary.removed, 2);
        assert_eq!(plan.stranded.len(), 1);
        assert_eq!(plan.stranded[0].instance_id, done.instance_id);
    }

    #[test]
    fn test_summary_helpers() {
        let summary = ResyncSummary {
            created: 1,
            preserved: 2,
            removed: 0,
            unchanged: 3,
        };
        assert_eq!(summary.total(), 6);
        assert!(!summary.is_noop());
        assert!(ResyncSummary::default().is_noop());
    }
}
