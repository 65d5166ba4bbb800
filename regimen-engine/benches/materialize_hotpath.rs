use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, Criterion};
use regimen_core::{
    AssignmentId, EntityIdType, IntervalType, PatientId, ProtocolTemplate, RecurrencePolicy,
    SchedulerConfig, TaskKind, TemplateTask, TenantId,
};
use regimen_engine::{materialize, plan_resync};
use std::hint::black_box;

fn bench_template(tasks: usize) -> ProtocolTemplate {
    let policies = [
        RecurrencePolicy::repeating(IntervalType::Daily),
        RecurrencePolicy::repeating(IntervalType::EveryOtherDay),
        RecurrencePolicy::repeating(IntervalType::Weekly),
        RecurrencePolicy::every(3),
        RecurrencePolicy::OneTime,
    ];
    (0..tasks).fold(
        ProtocolTemplate::new(TenantId::now_v7(), "Bench protocol", "bench"),
        |template, i| {
            template.with_task(
                TemplateTask::new(format!("Task {}", i), TaskKind::Exercise, (i % 30) as i32 - 7)
                    .with_recurrence(policies[i % policies.len()].clone()),
            )
        },
    )
}

fn bench_materialize(c: &mut Criterion) {
    let config = SchedulerConfig::default();
    let template = bench_template(20);
    let anchor = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
    let patient_id = PatientId::now_v7();

    c.bench_function("materialize/20_tasks_200_days", |b| {
        b.iter(|| {
            let drafts = materialize(
                black_box(&template),
                anchor,
                patient_id,
                template.tenant_id,
                &config,
            )
            .expect("materialize");
            black_box(drafts.len());
        });
    });
}

fn bench_resync_plan(c: &mut Criterion) {
    let config = SchedulerConfig::default();
    let template = bench_template(20);
    let anchor = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
    let patient_id = PatientId::now_v7();
    let fresh = materialize(&template, anchor, patient_id, template.tenant_id, &config)
        .expect("materialize");
    let now = chrono::Utc::now();
    let existing: Vec<_> = plan_resync(fresh.clone(), &[])
        .drafts
        .into_iter()
        .map(|d| d.into_instance(AssignmentId::now_v7(), now))
        .collect();

    c.bench_function("resync/plan_unchanged", |b| {
        b.iter(|| {
            let plan = plan_resync(black_box(fresh.clone()), black_box(&existing));
            black_box(plan.summary);
        });
    });
}

criterion_group!(benches, bench_materialize, bench_resync_plan);
criterion_main!(benches);
