//! Recurrence policies and persisted schedule settings.

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Longest custom interval accepted: one week.
pub const MAX_CUSTOM_MINUTES: u32 = 10_080;

/// Latest monthly day that exists in every month.
pub const MAX_MONTH_DAY: u32 = 28;

/// A named recurrence rule together with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Policy {
    /// At `minute` past every hour
    Hourly { minute: u32 },
    /// Every day at `hour:minute`
    Daily { hour: u32, minute: u32 },
    /// On `weekday` (0 = Monday .. 6 = Sunday) at `hour:minute`
    Weekly { weekday: u32, hour: u32, minute: u32 },
    /// On `day` of the month (clamped to 28) at `hour:minute`
    Monthly { day: u32, hour: u32, minute: u32 },
    /// Every `interval_minutes` from the moment of calculation
    Custom { interval_minutes: u32 },
}

impl Default for Policy {
    fn default() -> Self {
        Policy::Hourly { minute: 0 }
    }
}

impl Policy {
    /// Reject parameters outside their documented ranges.
    pub fn validate(&self) -> Result<()> {
        let check_time = |hour: u32, minute: u32| -> Result<()> {
            if hour > 23 {
                return Err(AppError::validation(format!("hour {hour} is not in 0-23")));
            }
            if minute > 59 {
                return Err(AppError::validation(format!(
                    "minute {minute} is not in 0-59"
                )));
            }
            Ok(())
        };

        match *self {
            Policy::Hourly { minute } => check_time(0, minute),
            Policy::Daily { hour, minute } => check_time(hour, minute),
            Policy::Weekly {
                weekday,
                hour,
                minute,
            } => {
                if weekday > 6 {
                    return Err(AppError::validation(format!(
                        "weekday {weekday} is not in 0-6"
                    )));
                }
                check_time(hour, minute)
            }
            Policy::Monthly { day, hour, minute } => {
                if !(1..=31).contains(&day) {
                    return Err(AppError::validation(format!("day {day} is not in 1-31")));
                }
                check_time(hour, minute)
            }
            Policy::Custom { interval_minutes } => {
                if !(1..=MAX_CUSTOM_MINUTES).contains(&interval_minutes) {
                    return Err(AppError::validation(format!(
                        "interval {interval_minutes} is not in 1-{MAX_CUSTOM_MINUTES} minutes"
                    )));
                }
                Ok(())
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Policy::Hourly { .. } => "hourly",
            Policy::Daily { .. } => "daily",
            Policy::Weekly { .. } => "weekly",
            Policy::Monthly { .. } => "monthly",
            Policy::Custom { .. } => "custom",
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Policy::Custom { .. })
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const WEEKDAYS: [&str; 7] = [
            "Monday",
            "Tuesday",
            "Wednesday",
            "Thursday",
            "Friday",
            "Saturday",
            "Sunday",
        ];
        match *self {
            Policy::Hourly { minute } => write!(f, "hourly at :{minute:02}"),
            Policy::Daily { hour, minute } => write!(f, "daily at {hour:02}:{minute:02}"),
            Policy::Weekly {
                weekday,
                hour,
                minute,
            } => write!(
                f,
                "weekly on {} at {hour:02}:{minute:02}",
                WEEKDAYS.get(weekday as usize).copied().unwrap_or("?")
            ),
            Policy::Monthly { day, hour, minute } => write!(
                f,
                "monthly on day {} at {hour:02}:{minute:02}",
                day.min(MAX_MONTH_DAY)
            ),
            Policy::Custom { interval_minutes } => {
                write!(f, "every {interval_minutes} minutes")
            }
        }
    }
}

/// The durable part of the schedule. Next-run times are never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub policy: Policy,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Local>>,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            policy: Policy::default(),
            updated_at: None,
        }
    }
}
