//! Recurrence Calculator
//!
//! Turns an anchor date, a day offset and a [`RecurrencePolicy`] into the
//! ordered calendar dates on which a template task falls. Pure and
//! deterministic; nothing here touches storage.

use chrono::Duration;
use regimen_core::{
    CalendarDate, ConfigError, EntityIdType, IntervalType, RecurrencePolicy, RegimenResult,
    SchedulerConfig, TemplateTask, TemplateTaskId,
};
use std::iter::FusedIterator;

/// Step between occurrences in days, or `None` for one-time policies.
///
/// Returns `None` as well for a `Custom` policy without a usable
/// `interval_days`; callers validate the policy first.
pub fn step_days(policy: &RecurrencePolicy, config: &SchedulerConfig) -> Option<i64> {
    match policy {
        RecurrencePolicy::OneTime => None,
        RecurrencePolicy::Repeating {
            interval_type,
            interval_days,
        } => {
            let step = match interval_type {
                IntervalType::Monthly => Some(i64::from(config.monthly_interval_days)),
                IntervalType::Custom => interval_days.map(i64::from),
                fixed => fixed.fixed_step_days(),
            };
            step.filter(|days| *days > 0)
        }
    }
}

/// Last date (inclusive) covered by repeating tasks.
pub fn horizon_end(anchor: CalendarDate, horizon_days: u32) -> CalendarDate {
    anchor
        .checked_add_signed(Duration::days(i64::from(horizon_days)))
        .unwrap_or(CalendarDate::MAX)
}

/// Lazy, finite sequence of occurrence dates.
///
/// Cloning yields an independent cursor at the same position, so a schedule
/// can be restarted by cloning it before iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceSchedule {
    next: Option<CalendarDate>,
    step: Option<i64>,
    horizon_end: CalendarDate,
}

impl RecurrenceSchedule {
    fn empty(horizon_end: CalendarDate) -> Self {
        Self {
            next: None,
            step: None,
            horizon_end,
        }
    }

    /// First date of the sequence, if any.
    pub fn first_date(&self) -> Option<CalendarDate> {
        self.next
    }
}

impl Iterator for RecurrenceSchedule {
    type Item = CalendarDate;

    fn next(&mut self) -> Option<CalendarDate> {
        let current = self.next?;
        self.next = match self.step {
            None => None,
            Some(step) => current
                .checked_add_signed(Duration::days(step))
                .filter(|candidate| *candidate <= self.horizon_end),
        };
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match (self.next, self.step) {
            (None, _) => 0,
            (Some(_), None) => 1,
            (Some(current), Some(step)) => {
                let span = (self.horizon_end - current).num_days().max(0);
                usize::try_from(span / step + 1).unwrap_or(usize::MAX)
            }
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RecurrenceSchedule {}

impl FusedIterator for RecurrenceSchedule {}

/// Expand a recurrence policy into its occurrence dates.
///
/// `OneTime` always yields exactly `anchor + day_offset`, wherever that falls
/// relative to the horizon. `Repeating` yields `anchor + day_offset` and every
/// step after it up to and including `anchor + horizon_days`, or nothing when
/// the start is already past that bound.
///
/// # Errors
/// - `ConfigError::InvalidValue` if `horizon_days` is zero or the config is invalid
/// - `ScheduleError::InvalidRecurrencePolicy` for a malformed custom policy.
///   The error carries a nil task id; use [`expand_task`] when the owning
///   task is known.
pub fn expand(
    anchor: CalendarDate,
    day_offset: i32,
    policy: &RecurrencePolicy,
    horizon_days: u32,
    config: &SchedulerConfig,
) -> RegimenResult<RecurrenceSchedule> {
    expand_checked(
        anchor,
        day_offset,
        policy,
        horizon_days,
        config,
        TemplateTaskId::nil(),
    )
}

/// Expand the occurrence dates of a template task.
pub fn expand_task(
    anchor: CalendarDate,
    task: &TemplateTask,
    horizon_days: u32,
    config: &SchedulerConfig,
) -> RegimenResult<RecurrenceSchedule> {
    expand_checked(
        anchor,
        task.day_offset,
        &task.recurrence,
        horizon_days,
        config,
        task.task_id,
    )
}

fn expand_checked(
    anchor: CalendarDate,
    day_offset: i32,
    policy: &RecurrencePolicy,
    horizon_days: u32,
    config: &SchedulerConfig,
    task_id: TemplateTaskId,
) -> RegimenResult<RecurrenceSchedule> {
    if horizon_days == 0 {
        return Err(ConfigError::InvalidValue {
            field: "horizon_days".to_string(),
            value: horizon_days.to_string(),
            reason: "horizon_days must be greater than 0".to_string(),
        }
        .into());
    }
    config.validate()?;
    policy.validate(task_id)?;

    let horizon_end = horizon_end(anchor, horizon_days);
    let Some(start) = anchor.checked_add_signed(Duration::days(i64::from(day_offset))) else {
        return Ok(RecurrenceSchedule::empty(horizon_end));
    };

    let schedule = match policy {
        RecurrencePolicy::OneTime => RecurrenceSchedule {
            next: Some(start),
            step: None,
            horizon_end,
        },
        RecurrencePolicy::Repeating { .. } => RecurrenceSchedule {
            next: Some(start).filter(|s| *s <= horizon_end),
            step: step_days(policy, config),
            horizon_end,
        },
    };
    Ok(schedule)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use regimen_core::{RegimenError, ScheduleError, TaskKind};

    fn date(y: i32, m: u32, d: u32) -> CalendarDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig::default()
    }

    #[test]
    fn test_daily_horizon_is_inclusive() {
        let dates: Vec<_> = expand(
            date(2024, 1, 1),
            0,
            &RecurrencePolicy::repeating(IntervalType::Daily),
            200,
            &config(),
        )
        .unwrap()
        .collect();
        assert_eq!(dates.len(), 201);
        assert_eq!(dates[0], date(2024, 1, 1));
        assert_eq!(dates[200], date(2024, 7, 19));
    }

    #[test]
    fn test_weekly_from_offset_two() {
        let dates: Vec<_> = expand(
            date(2024, 1, 1),
            2,
            &RecurrencePolicy::repeating(IntervalType::Weekly),
            21,
            &config(),
        )
        .unwrap()
        .collect();
        assert_eq!(
            dates,
            vec![date(2024, 1, 3), date(2024, 1, 10), date(2024, 1, 17)]
        );
    }

    #[test]
    fn test_one_time_ignores_horizon() {
        let dates: Vec<_> = expand(date(2024, 1, 1), 5, &RecurrencePolicy::OneTime, 3, &config())
            .unwrap()
            .collect();
        assert_eq!(dates, vec![date(2024, 1, 6)]);
    }

    #[test]
    fn test_pre_anchor_offsets() {
        let dates: Vec<_> = expand(
            date(2024, 1, 10),
            -3,
            &RecurrencePolicy::repeating(IntervalType::Daily),
            1,
            &config(),
        )
        .unwrap()
        .collect();
        assert_eq!(
            dates,
            vec![
                date(2024, 1, 7),
                date(2024, 1, 8),
                date(2024, 1, 9),
                date(2024, 1, 10),
                date(2024, 1, 11),
            ]
        );
    }

    #[test]
    fn test_repeating_start_past_horizon_is_empty() {
        let schedule = expand(
            date(2024, 1, 1),
            30,
            &RecurrencePolicy::repeating(IntervalType::Weekly),
            21,
            &config(),
        )
        .unwrap();
        assert_eq!(schedule.len(), 0);
        assert_eq!(schedule.first_date(), None);
    }

    #[test]
    fn test_repeating_start_on_horizon_end_is_kept() {
        let dates: Vec<_> = expand(
            date(2024, 1, 1),
            21,
            &RecurrencePolicy::repeating(IntervalType::Biweekly),
            21,
            &config(),
        )
        .unwrap()
        .collect();
        assert_eq!(dates, vec![date(2024, 1, 22)]);
    }

    #[test]
    fn test_monthly_uses_configured_length() {
        let config = SchedulerConfig {
            monthly_interval_days: 28,
            ..SchedulerConfig::default()
        };
        let dates: Vec<_> = expand(
            date(2024, 1, 1),
            0,
            &RecurrencePolicy::repeating(IntervalType::Monthly),
            60,
            &config,
        )
        .unwrap()
        .collect();
        assert_eq!(dates, vec![date(2024, 1, 1), date(2024, 1, 29), date(2024, 2, 26)]);
    }

    #[test]
    fn test_step_sizes() {
        let config = config();
        assert_eq!(step_days(&RecurrencePolicy::OneTime, &config), None);
        assert_eq!(step_days(&RecurrencePolicy::repeating(IntervalType::Daily), &config), Some(1));
        assert_eq!(
            step_days(&RecurrencePolicy::repeating(IntervalType::EveryOtherDay), &config),
            Some(2)
        );
        assert_eq!(step_days(&RecurrencePolicy::repeating(IntervalType::Weekly), &config), Some(7));
        assert_eq!(
            step_days(&RecurrencePolicy::repeating(IntervalType::Biweekly), &config),
            Some(14)
        );
        assert_eq!(
            step_days(&RecurrencePolicy::repeating(IntervalType::Monthly), &config),
            Some(30)
        );
        assert_eq!(step_days(&RecurrencePolicy::every(3), &config), Some(3));
        assert_eq!(step_days(&RecurrencePolicy::every(0), &config), None);
    }

    #[test]
    fn test_invalid_custom_policy_reports_task() {
        let task = TemplateTask::new("Log pain", TaskKind::Form, 0).with_recurrence(
            RecurrencePolicy::Repeating {
                interval_type: IntervalType::Custom,
                interval_days: None,
            },
        );
        let result = expand_task(date(2024, 1, 1), &task, 200, &config());
        assert!(matches!(
            result,
            Err(RegimenError::Schedule(ScheduleError::InvalidRecurrencePolicy { task_id, .. }))
                if task_id == task.task_id
        ));
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let result = expand(date(2024, 1, 1), 0, &RecurrencePolicy::OneTime, 0, &config());
        assert!(matches!(result, Err(RegimenError::Config(_))));
    }

    #[test]
    fn test_schedule_restarts_from_clone() {
        let schedule = expand(
            date(2024, 1, 1),
            0,
            &RecurrencePolicy::repeating(IntervalType::EveryOtherDay),
            10,
            &config(),
        )
        .unwrap();
        let first: Vec<_> = schedule.clone().collect();
        let second: Vec<_> = schedule.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 6);
    }

    #[test]
    fn test_dates_near_calendar_end_terminate() {
        let dates: Vec<_> = expand(
            CalendarDate::MAX - Duration::days(3),
            0,
            &RecurrencePolicy::repeating(IntervalType::Daily),
            200,
            &config(),
        )
        .unwrap()
        .collect();
        assert_eq!(dates.len(), 4);
        assert_eq!(dates.last(), Some(&CalendarDate::MAX));
    }
}
