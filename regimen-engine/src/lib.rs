//! REGIMEN Engine - Protocol Scheduling
//!
//! Turns protocol templates into dated, per-patient task instances and keeps
//! them in step with template edits and anchor-date corrections without
//! losing recorded progress.
//!
//! Control flow: template lookup → [`materialize`] (via [`recurrence`]) →
//! [`resync`] planning → atomic replace through the persistence port. The
//! [`recovery_day`] translator answers "what is due today" independently.

pub mod materialize;
pub mod recovery_day;
pub mod recurrence;
pub mod resync;
pub mod scheduler;
pub mod telemetry;

pub use materialize::materialize;
pub use recovery_day::{date_for_day, due_date, phase, recovery_day, RecoveryPosition};
pub use recurrence::{expand, expand_task, horizon_end, step_days, RecurrenceSchedule};
pub use resync::{plan_resync, ResyncOptions, ResyncPlan, ResyncSummary};
pub use scheduler::{
    resolve_anchor, AssignProtocolRequest, AssignmentOutcome, ProtocolScheduler, ResyncReport,
};
pub use telemetry::{init_tracing, LogFormat};
