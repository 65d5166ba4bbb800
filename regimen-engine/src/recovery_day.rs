//! Day-offset / recovery-day translation
//!
//! The recovery day is the signed number of whole calendar days from the
//! anchor date to a reference date. Day 0 is the anchor itself and negative
//! days are pre-operative.

use chrono::Duration;
use regimen_core::{CalendarDate, RecoveryPhase};
use serde::{Deserialize, Serialize};

/// Whole days from `anchor` to `reference` (reference minus anchor).
pub fn recovery_day(anchor: CalendarDate, reference: CalendarDate) -> i64 {
    reference.signed_duration_since(anchor).num_days()
}

/// Calendar date of `day` relative to `anchor`, if representable.
pub fn date_for_day(anchor: CalendarDate, day: i64) -> Option<CalendarDate> {
    Duration::try_days(day).and_then(|delta| anchor.checked_add_signed(delta))
}

/// Date whose instances are due on `reference`.
pub fn due_date(anchor: CalendarDate, reference: CalendarDate) -> Option<CalendarDate> {
    date_for_day(anchor, recovery_day(anchor, reference))
}

/// Recovery phase of `reference` relative to `anchor`.
pub fn phase(anchor: CalendarDate, reference: CalendarDate) -> RecoveryPhase {
    RecoveryPhase::for_day(recovery_day(anchor, reference))
}

/// A patient's position on their recovery timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RecoveryPosition {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date"))]
    pub anchor_date: CalendarDate,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date"))]
    pub reference_date: CalendarDate,
    pub recovery_day: i64,
    pub phase: RecoveryPhase,
}

impl RecoveryPosition {
    pub fn at(anchor_date: CalendarDate, reference_date: CalendarDate) -> Self {
        let day = recovery_day(anchor_date, reference_date);
        Self {
            anchor_date,
            reference_date,
            recovery_day: day,
            phase: RecoveryPhase::for_day(day),
        }
    }
}
