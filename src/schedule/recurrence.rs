// src/schedule/recurrence.rs

//! Next-run computation and poll hints.
//!
//! All times are local wall-clock `NaiveDateTime`s. A target equal to `now`
//! counts as already passed, so the result is always strictly after `now`.

use std::time::Duration;

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike};

use crate::error::{AppError, Result};
use crate::models::{MAX_MONTH_DAY, Policy};

/// Shortest poll hint.
pub const MIN_POLL: Duration = Duration::from_secs(1);
/// Longest poll hint.
pub const MAX_POLL: Duration = Duration::from_secs(300);

const CUSTOM_POLL_FLOOR: Duration = Duration::from_secs(10);
const NEAR_POLL_FLOOR: Duration = Duration::from_secs(10);
const NEAR_POLL_CEILING: Duration = Duration::from_secs(60);

/// Earliest time strictly after `now` that matches `policy`.
pub fn next_run(policy: &Policy, now: NaiveDateTime) -> Result<NaiveDateTime> {
    policy.validate()?;

    let next = match *policy {
        Policy::Hourly { minute } => {
            let target = at(now.date(), now.hour(), minute)?;
            if now >= target {
                target + TimeDelta::hours(1)
            } else {
                target
            }
        }
        Policy::Daily { hour, minute } => {
            let target = at(now.date(), hour, minute)?;
            if now >= target {
                target + TimeDelta::days(1)
            } else {
                target
            }
        }
        Policy::Weekly {
            weekday,
            hour,
            minute,
        } => {
            let today = now.date().weekday().num_days_from_monday() as i64;
            let target_today = at(now.date(), hour, minute)?;
            let mut days_ahead = weekday as i64 - today;
            if days_ahead < 0 || (days_ahead == 0 && now >= target_today) {
                days_ahead += 7;
            }
            target_today + TimeDelta::days(days_ahead)
        }
        Policy::Monthly { day, hour, minute } => {
            let day = day.min(MAX_MONTH_DAY);
            let target = at(month_day(now.year(), now.month(), day)?, hour, minute)?;
            if now >= target {
                let (year, month) = if now.month() == 12 {
                    (now.year() + 1, 1)
                } else {
                    (now.year(), now.month() + 1)
                };
                at(month_day(year, month, day)?, hour, minute)?
            } else {
                target
            }
        }
        Policy::Custom { interval_minutes } => now + TimeDelta::minutes(interval_minutes as i64),
    };

    Ok(next)
}

/// Suggested wait before the next tick.
///
/// Custom schedules poll at half their interval. Fixed schedules poll
/// faster as the next run approaches.
pub fn poll_interval(policy: &Policy, next_run: NaiveDateTime, now: NaiveDateTime) -> Duration {
    if let Policy::Custom { interval_minutes } = *policy {
        let half = Duration::from_secs(u64::from(interval_minutes) * 60 / 2);
        return half.clamp(CUSTOM_POLL_FLOOR, MAX_POLL);
    }

    let remaining_ms = (next_run - now).num_milliseconds();
    if remaining_ms <= 60_000 {
        Duration::from_millis(remaining_ms.max(0) as u64).max(MIN_POLL)
    } else if remaining_ms <= 3_600_000 {
        Duration::from_millis(remaining_ms as u64 / 10).clamp(NEAR_POLL_FLOOR, NEAR_POLL_CEILING)
    } else {
        MAX_POLL
    }
}

fn at(date: NaiveDate, hour: u32, minute: u32) -> Result<NaiveDateTime> {
    date.and_hms_opt(hour, minute, 0)
        .ok_or_else(|| AppError::validation(format!("invalid time {hour:02}:{minute:02}")))
}

fn month_day(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| AppError::validation(format!("invalid date {year}-{month:02}-{day:02}")))
}
