//! Enum types for REGIMEN entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error when parsing an enum from its database string representation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind}: {value}")]
pub struct EnumParseError {
    pub kind: &'static str,
    pub value: String,
}

impl EnumParseError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Wires `Display` and `FromStr` to `as_db_str` / `from_db_str`.
macro_rules! db_str_traits {
    ($name:ident) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_db_str())
            }
        }

        impl FromStr for $name {
            type Err = EnumParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_db_str(s)
            }
        }
    };
}

// ============================================================================
// ENTITY TYPE
// ============================================================================

/// Entity type discriminator for polymorphic references and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum EntityType {
    Tenant,
    Patient,
    Protocol,
    TemplateTask,
    Assignment,
    Instance,
}

// ============================================================================
// TASK KIND
// ============================================================================

/// What the patient is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum TaskKind {
    Exercise,
    Form,
    Education,
    Video,
    Assessment,
}

impl TaskKind {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TaskKind::Exercise => "exercise",
            TaskKind::Form => "form",
            TaskKind::Education => "education",
            TaskKind::Video => "video",
            TaskKind::Assessment => "assessment",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s.to_lowercase().as_str() {
            "exercise" => Ok(TaskKind::Exercise),
            "form" => Ok(TaskKind::Form),
            "education" => Ok(TaskKind::Education),
            "video" => Ok(TaskKind::Video),
            "assessment" => Ok(TaskKind::Assessment),
            _ => Err(EnumParseError::new("task kind", s)),
        }
    }
}

db_str_traits!(TaskKind);

// ============================================================================
// TASK STATUS
// ============================================================================

/// Progress state of a materialized task instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum TaskStatus {
    /// Not started
    #[default]
    Pending,
    /// Started but not finished
    InProgress,
    /// Finished; terminal
    Completed,
}

impl TaskStatus {
    /// Whether this status carries recorded progress that resync must keep.
    pub fn has_progress(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" | "inprogress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            _ => Err(EnumParseError::new("task status", s)),
        }
    }
}

db_str_traits!(TaskStatus);

// ============================================================================
// INTERVAL TYPE
// ============================================================================

/// Cadence of a repeating task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum IntervalType {
    Daily,
    EveryOtherDay,
    Weekly,
    Biweekly,
    /// Fixed-length month, see `SchedulerConfig::monthly_interval_days`
    Monthly,
    /// Uses the policy's `interval_days`
    Custom,
}

impl IntervalType {
    /// Fixed step in days, or `None` when the step comes from configuration
    /// (`Monthly`) or from the policy itself (`Custom`).
    pub fn fixed_step_days(&self) -> Option<i64> {
        match self {
            IntervalType::Daily => Some(1),
            IntervalType::EveryOtherDay => Some(2),
            IntervalType::Weekly => Some(7),
            IntervalType::Biweekly => Some(14),
            IntervalType::Monthly | IntervalType::Custom => None,
        }
    }

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            IntervalType::Daily => "daily",
            IntervalType::EveryOtherDay => "every_other_day",
            IntervalType::Weekly => "weekly",
            IntervalType::Biweekly => "biweekly",
            IntervalType::Monthly => "monthly",
            IntervalType::Custom => "custom",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(IntervalType::Daily),
            "every_other_day" => Ok(IntervalType::EveryOtherDay),
            "weekly" => Ok(IntervalType::Weekly),
            "biweekly" => Ok(IntervalType::Biweekly),
            "monthly" => Ok(IntervalType::Monthly),
            "custom" => Ok(IntervalType::Custom),
            _ => Err(EnumParseError::new("interval type", s)),
        }
    }
}

db_str_traits!(IntervalType);

// ============================================================================
// ASSIGNMENT STATUS
// ============================================================================

/// Lifecycle of a patient's protocol assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum AssignmentStatus {
    #[default]
    Active,
    Completed,
    Paused,
}

impl AssignmentStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Active => "active",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Paused => "paused",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AssignmentStatus::Active),
            "completed" => Ok(AssignmentStatus::Completed),
            "paused" => Ok(AssignmentStatus::Paused),
            _ => Err(EnumParseError::new("assignment status", s)),
        }
    }
}

db_str_traits!(AssignmentStatus);

// ============================================================================
// RECOVERY PHASE
// ============================================================================

/// Coarse banding of the recovery day, used by dashboards and messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum RecoveryPhase {
    /// Before the anchor date
    PreOperative,
    /// Days 0-14
    Early,
    /// Days 15-42
    Mid,
    /// Days 43-90
    Late,
    /// Day 91 onward
    Maintenance,
}

impl RecoveryPhase {
    /// Band a signed recovery day.
    pub fn for_day(recovery_day: i64) -> Self {
        match recovery_day {
            i64::MIN..=-1 => RecoveryPhase::PreOperative,
            0..=14 => RecoveryPhase::Early,
            15..=42 => RecoveryPhase::Mid,
            43..=90 => RecoveryPhase::Late,
            _ => RecoveryPhase::Maintenance,
        }
    }

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            RecoveryPhase::PreOperative => "pre_operative",
            RecoveryPhase::Early => "early",
            RecoveryPhase::Mid => "mid",
            RecoveryPhase::Late => "late",
            RecoveryPhase::Maintenance => "maintenance",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s.to_lowercase().as_str() {
            "pre_operative" => Ok(RecoveryPhase::PreOperative),
            "early" => Ok(RecoveryPhase::Early),
            "mid" => Ok(RecoveryPhase::Mid),
            "late" => Ok(RecoveryPhase::Late),
            "maintenance" => Ok(RecoveryPhase::Maintenance),
            _ => Err(EnumParseError::new("recovery phase", s)),
        }
    }
}

db_str_traits!(RecoveryPhase);
