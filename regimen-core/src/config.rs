//! Scheduler configuration
//!
//! Recurrence defaults are named, injectable values rather than literals so
//! they can be tuned per deployment, and the horizon per protocol.

use crate::{ConfigError, ProtocolTemplate, RegimenResult};
use serde::{Deserialize, Serialize};

/// Default number of days past the anchor for which recurring tasks are generated.
pub const DEFAULT_HORIZON_DAYS: u32 = 200;

/// Default length of a "monthly" interval. Not calendar-month aware.
pub const DEFAULT_MONTHLY_INTERVAL_DAYS: u32 = 30;

/// Configuration consumed by the recurrence calculator and materializer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SchedulerConfig {
    /// Days past the anchor date covered by repeating tasks (inclusive).
    pub horizon_days: u32,
    /// Step used by `IntervalType::Monthly`.
    pub monthly_interval_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            horizon_days: DEFAULT_HORIZON_DAYS,
            monthly_interval_days: DEFAULT_MONTHLY_INTERVAL_DAYS,
        }
    }
}

impl SchedulerConfig {
    /// Create SchedulerConfig from environment variables.
    ///
    /// Environment variables:
    /// - `REGIMEN_HORIZON_DAYS`: Scheduling horizon in days (default: 200)
    /// - `REGIMEN_MONTHLY_INTERVAL_DAYS`: Length of a monthly step (default: 30)
    ///
    /// Missing or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let horizon_days = std::env::var("REGIMEN_HORIZON_DAYS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_HORIZON_DAYS);

        let monthly_interval_days = std::env::var("REGIMEN_MONTHLY_INTERVAL_DAYS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_MONTHLY_INTERVAL_DAYS);

        Self {
            horizon_days,
            monthly_interval_days,
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - horizon_days > 0
    /// - monthly_interval_days > 0
    pub fn validate(&self) -> RegimenResult<()> {
        if self.horizon_days == 0 {
            return Err(ConfigError::InvalidValue {
                field: "horizon_days".to_string(),
                value: self.horizon_days.to_string(),
                reason: "horizon_days must be greater than 0".to_string(),
            }
            .into());
        }

        if self.monthly_interval_days == 0 {
            return Err(ConfigError::InvalidValue {
                field: "monthly_interval_days".to_string(),
                value: self.monthly_interval_days.to_string(),
                reason: "monthly_interval_days must be greater than 0".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Horizon to use for `template`, honoring its override.
    pub fn horizon_for(&self, template: &ProtocolTemplate) -> u32 {
        template.horizon_days.unwrap_or(self.horizon_days)
    }
}

// =============================================================================
// TESTS
// =============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Any positive horizon and month length validate.
        #[test]
        fn prop_positive_values_validate(horizon in 1u32..10_000, month in 1u32..400) {
            let config = SchedulerConfig { horizon_days: horizon, monthly_interval_days: month };
            prop_assert!(config.validate().is_ok());
        }

        /// A zero in either field is rejected.
        #[test]
        fn prop_zero_values_rejected(horizon in 0u32..2, month in 0u32..2) {
            prop_assume!(horizon == 0 || month == 0);
            let config = SchedulerConfig { horizon_days: horizon, monthly_interval_days: month };
            prop_assert!(config.validate().is_err());
        }
    }
}
