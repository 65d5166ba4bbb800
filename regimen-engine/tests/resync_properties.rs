//! Property and scenario tests for the resync path.

use proptest::prelude::*;
use regimen_engine::{materialize, AssignProtocolRequest, ProtocolScheduler, ResyncOptions};
use regimen_test_utils::assertions::*;
use regimen_test_utils::fixtures::*;
use regimen_test_utils::generators::*;
use regimen_test_utils::*;

fn scheduler_for(template: &ProtocolTemplate) -> (ProtocolScheduler<MockStorage>, Patient) {
    let (storage, patient) = seeded_storage(template);
    let scheduler = ProtocolScheduler::new(storage, default_config()).unwrap();
    (scheduler, patient)
}

fn expected_keys(template: &ProtocolTemplate, patient: &Patient) -> Vec<LogicalKey> {
    materialize(
        template,
        surgery_date(),
        patient.patient_id,
        patient.tenant_id,
        &default_config(),
    )
    .unwrap()
    .iter()
    .map(|d| d.logical_key())
    .collect()
}

#[test]
fn weekly_task_lands_on_expected_dates() {
    let template = weekly_template(TenantId::now_v7());
    let (scheduler, patient) = scheduler_for(&template);

    let outcome = scheduler
        .assign_protocol(&AssignProtocolRequest::new(patient.patient_id, template.protocol_id))
        .unwrap();
    assert_eq!(outcome.tasks_created, 3);

    let dates: Vec<_> = scheduler
        .storage()
        .instance_list(patient.patient_id, outcome.assignment.assignment_id)
        .unwrap()
        .iter()
        .map(|i| i.scheduled_date)
        .collect();
    assert_eq!(dates, vec![date(2024, 1, 3), date(2024, 1, 10), date(2024, 1, 17)]);
}

#[test]
fn completed_instance_survives_protocol_edit() {
    let mut template = weekly_template(TenantId::now_v7());
    let weekly_task = template.tasks[0].task_id;
    let (scheduler, patient) = scheduler_for(&template);
    let outcome = scheduler
        .assign_protocol(&AssignProtocolRequest::new(patient.patient_id, template.protocol_id))
        .unwrap();
    let assignment_id = outcome.assignment.assignment_id;

    let target = scheduler
        .storage()
        .instance_list(patient.patient_id, assignment_id)
        .unwrap()
        .into_iter()
        .find(|i| i.logical_key() == LogicalKey::new(weekly_task, date(2024, 1, 10)))
        .unwrap();
    let completed = scheduler
        .record_completion(
            target.instance_id,
            TaskStatus::Completed,
            Some(serde_json::json!({"pain": 3})),
        )
        .unwrap();

    // Provider adds a task; the weekly task is untouched.
    template = template.with_task(TemplateTask::new("Incision photo", TaskKind::Form, 5));
    scheduler.storage().template_update(&template).unwrap();
    let reports = scheduler
        .protocol_edited(template.protocol_id, ResyncOptions::default())
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].summary.created, 1);
    assert_eq!(reports[0].summary.preserved, 1);
    assert_eq!(reports[0].summary.removed, 0);

    let after = scheduler
        .storage()
        .instance_list(patient.patient_id, assignment_id)
        .unwrap();
    let kept = after
        .iter()
        .find(|i| i.logical_key() == completed.logical_key())
        .unwrap();
    assert_eq!(kept.instance_id, completed.instance_id);
    assert_eq!(kept.status, TaskStatus::Completed);
    assert_eq!(kept.completed_at, completed.completed_at);
    assert_eq!(kept.completion_payload, Some(serde_json::json!({"pain": 3})));
}

#[test]
fn title_edits_propagate_on_resync() {
    let mut template = knee_replacement_template(TenantId::now_v7());
    let (scheduler, patient) = scheduler_for(&template);
    scheduler
        .assign_protocol(&AssignProtocolRequest::new(patient.patient_id, template.protocol_id))
        .unwrap();

    template.tasks[4].title = "Driving after knee surgery".to_string();
    scheduler.storage().template_update(&template).unwrap();
    let summary = scheduler
        .resync_protocol(patient.patient_id, template.protocol_id)
        .unwrap();
    assert!(summary.is_noop());

    let renamed = scheduler
        .storage()
        .instance_list_by_patient(patient.patient_id)
        .unwrap()
        .into_iter()
        .find(|i| i.template_task_id == template.tasks[4].task_id)
        .unwrap();
    assert_eq!(renamed.title, "Driving after knee surgery");
}

#[test]
fn removed_task_leaves_no_orphans() {
    let mut template = knee_replacement_template(TenantId::now_v7());
    let (scheduler, patient) = scheduler_for(&template);
    scheduler
        .assign_protocol(&AssignProtocolRequest::new(patient.patient_id, template.protocol_id))
        .unwrap();

    let dropped = template.tasks.remove(1);
    scheduler.storage().template_update(&template).unwrap();
    let summary = scheduler
        .resync_protocol(patient.patient_id, template.protocol_id)
        .unwrap();
    assert!(summary.removed > 0);
    assert_eq!(summary.created, 0);

    let after = scheduler
        .storage()
        .instance_list_by_patient(patient.patient_id)
        .unwrap();
    assert!(after.iter().all(|i| i.template_task_id != dropped.task_id));
    assert_keys_match(&after, &expected_keys(&template, &patient));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// A second resync with no completions in between changes nothing, and
    /// the instance set matches the template exactly.
    #[test]
    fn prop_resync_is_idempotent(
        template in arb_template(TenantId::nil(), 5),
        completions in prop::collection::vec((any::<prop::sample::Index>(), arb_task_status()), 0..6),
    ) {
        let (scheduler, patient) = scheduler_for(&template);
        let outcome = scheduler
            .assign_protocol(&AssignProtocolRequest::new(patient.patient_id, template.protocol_id))
            .unwrap();
        let assignment_id = outcome.assignment.assignment_id;

        let initial = scheduler.storage().instance_list(patient.patient_id, assignment_id).unwrap();
        if !initial.is_empty() {
            for (index, status) in &completions {
                let target = &initial[index.index(initial.len())];
                scheduler
                    .record_completion(target.instance_id, *status, Some(pain_payload(2)))
                    .unwrap();
            }
        }

        let before = scheduler.storage().instance_list(patient.patient_id, assignment_id).unwrap();
        let first = scheduler.resync_protocol(patient.patient_id, template.protocol_id).unwrap();
        let once = scheduler.storage().instance_list(patient.patient_id, assignment_id).unwrap();
        let second = scheduler.resync_protocol(patient.patient_id, template.protocol_id).unwrap();
        let twice = scheduler.storage().instance_list(patient.patient_id, assignment_id).unwrap();

        prop_assert!(first.is_noop());
        prop_assert_eq!(first, second);
        assert_same_instance_set(&before, &once);
        assert_same_instance_set(&once, &twice);
        assert_unique_logical_keys(&twice);
        assert_keys_match(&twice, &expected_keys(&template, &patient));
    }

    /// Editing a template never loses progress on keys that survive the edit.
    #[test]
    fn prop_progress_preserved_across_edits(
        template in arb_template(TenantId::nil(), 4),
        extra in arb_template_task(),
        drop_first in any::<bool>(),
        status in arb_task_status(),
    ) {
        let (scheduler, patient) = scheduler_for(&template);
        scheduler
            .assign_protocol(&AssignProtocolRequest::new(patient.patient_id, template.protocol_id))
            .unwrap();

        let initial = scheduler.storage().instance_list_by_patient(patient.patient_id).unwrap();
        for instance in initial.iter().step_by(2) {
            scheduler
                .record_completion(instance.instance_id, status, Some(pain_payload(4)))
                .unwrap();
        }
        let before = scheduler.storage().instance_list_by_patient(patient.patient_id).unwrap();

        let mut edited = template.clone().with_task(extra);
        if drop_first && !edited.tasks.is_empty() {
            edited.tasks.remove(0);
        }
        scheduler.storage().template_update(&edited).unwrap();
        scheduler
            .protocol_edited(edited.protocol_id, ResyncOptions::default())
            .unwrap();

        let after = scheduler.storage().instance_list_by_patient(patient.patient_id).unwrap();
        assert_progress_preserved(&before, &after);
        assert_keys_match(&after, &expected_keys(&edited, &patient));
    }
}
