/// Schedule Preview - Materializes a protocol template for a given anchor date
///
/// Usage: cargo run --bin regimen-preview <template.json> <anchor-date> [reference-date]
///
/// Logging honors RUST_LOG and REGIMEN_LOG_FORMAT (text | json).

use chrono::NaiveDate;
use regimen_core::{
    CalendarDate, EntityIdType, Patient, ProtocolTemplate, RecurrencePolicy, RegimenResult,
    TaskKind, TemplateTask, TenantId,
};
use regimen_engine::{init_tracing, phase, AssignProtocolRequest, LogFormat, ProtocolScheduler};
use regimen_storage::{MockStorage, StorageTrait};
use serde::Deserialize;
use std::fs;

/// Authoring format for a template file. Ids and timestamps are assigned on load.
#[derive(Debug, Deserialize)]
struct TemplateFile {
    title: String,
    condition: String,
    #[serde(default)]
    horizon_days: Option<u32>,
    tasks: Vec<TaskFile>,
}

#[derive(Debug, Deserialize)]
struct TaskFile {
    title: String,
    #[serde(default)]
    description: Option<String>,
    kind: TaskKind,
    day_offset: i32,
    #[serde(default = "one_time")]
    recurrence: RecurrencePolicy,
}

fn one_time() -> RecurrencePolicy {
    RecurrencePolicy::OneTime
}

impl TemplateFile {
    fn into_template(self, tenant_id: TenantId) -> ProtocolTemplate {
        let mut template = ProtocolTemplate::new(tenant_id, self.title, self.condition);
        template.horizon_days = self.horizon_days;
        for task in self.tasks {
            let mut built = TemplateTask::new(task.title, task.kind, task.day_offset)
                .with_recurrence(task.recurrence);
            built.description = task.description;
            template = template.with_task(built);
        }
        template
    }
}

fn parse_date(label: &str, value: &str) -> CalendarDate {
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Invalid {} '{}': {} (expected YYYY-MM-DD)", label, value, e);
            std::process::exit(1);
        }
    }
}

fn run(
    template: ProtocolTemplate,
    anchor: CalendarDate,
    reference: Option<CalendarDate>,
) -> RegimenResult<()> {
    let storage = MockStorage::new();
    let patient = Patient::new(template.tenant_id, Some(anchor));
    storage.template_insert(&template)?;
    storage.patient_insert(&patient)?;

    let scheduler = ProtocolScheduler::from_env(storage)?;
    let outcome = scheduler.assign_protocol(&AssignProtocolRequest::new(
        patient.patient_id,
        template.protocol_id,
    ))?;

    println!("Protocol:  {} ({})", template.title, template.condition);
    println!("Anchor:    {}", anchor);
    println!("Horizon:   {} days", scheduler.config().horizon_for(&template));
    println!("Instances: {}", outcome.tasks_created);
    println!();
    println!("{:<12} {:>5}  {:<14} {:<11} TITLE", "DATE", "DAY", "PHASE", "KIND");

    let instances = scheduler
        .storage()
        .instance_list(patient.patient_id, outcome.assignment.assignment_id)?;
    for instance in &instances {
        println!(
            "{:<12} {:>5}  {:<14} {:<11} {}",
            instance.scheduled_date.to_string(),
            instance.recovery_day,
            phase(anchor, instance.scheduled_date).to_string(),
            instance.kind.to_string(),
            instance.title
        );
    }

    if let Some(reference) = reference {
        let due = scheduler.get_due_instances(patient.patient_id, reference)?;
        println!();
        println!("Due on {} ({} task(s)):", reference, due.len());
        for instance in &due {
            println!("  - {}", instance.title);
        }
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: cargo run --bin regimen-preview <template.json> <anchor-date> [reference-date]");
        eprintln!();
        eprintln!("Example:");
        eprintln!("  cargo run --bin regimen-preview regimen-engine/demos/knee-replacement.json 2024-01-01 2024-01-08");
        std::process::exit(1);
    }

    if let Err(e) = init_tracing(LogFormat::from_env()) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    let content = match fs::read_to_string(&args[1]) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to read {}: {}", args[1], e);
            std::process::exit(1);
        }
    };

    let file: TemplateFile = match serde_json::from_str(&content) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to parse {}: {}", args[1], e);
            std::process::exit(1);
        }
    };

    let anchor = parse_date("anchor date", &args[2]);
    let reference = args.get(3).map(|r| parse_date("reference date", r));

    if let Err(e) = run(file.into_template(TenantId::now_v7()), anchor, reference) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
