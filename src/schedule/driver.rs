// src/schedule/driver.rs

//! Schedule state machine.
//!
//! Every transition goes through [`reduce`], which takes the current state,
//! one command and the current time, and returns the next state plus a
//! signal for the caller. The driver never sleeps or fetches on its own.

use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;

use crate::error::Result;
use crate::models::{Policy, ScheduleSettings};
use crate::schedule::recurrence::{next_run, poll_interval};

/// A gap between ticks longer than this means the host was suspended.
pub const WATCHDOG_GAP_SECS: i64 = 600;
/// A custom schedule's next run may not be further out than this.
pub const CUSTOM_HORIZON_SECS: i64 = 24 * 60 * 60;

/// In-memory schedule state. Only `enabled` and `policy` are durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleState {
    pub enabled: bool,
    pub policy: Policy,
    pub next_run_time: Option<NaiveDateTime>,
    pub last_check_time: Option<NaiveDateTime>,
    pub poll_interval: Option<Duration>,
    /// A triggered fetch has not reported back yet.
    pub in_flight: bool,
}

impl ScheduleState {
    /// Build state from persisted settings, computing the next run fresh.
    pub fn from_settings(settings: &ScheduleSettings, now: NaiveDateTime) -> Result<Self> {
        let mut state = Self {
            enabled: settings.enabled,
            policy: settings.policy,
            next_run_time: None,
            last_check_time: None,
            poll_interval: None,
            in_flight: false,
        };
        if state.enabled {
            state.reschedule(now)?;
            state.last_check_time = Some(now);
        }
        Ok(state)
    }

    pub fn settings(&self) -> ScheduleSettings {
        ScheduleSettings {
            enabled: self.enabled,
            policy: self.policy,
            updated_at: None,
        }
    }

    fn reschedule(&mut self, now: NaiveDateTime) -> Result<()> {
        let next = next_run(&self.policy, now)?;
        self.next_run_time = Some(next);
        self.poll_interval = Some(poll_interval(&self.policy, next, now));
        Ok(())
    }

    fn refresh_poll(&mut self, now: NaiveDateTime) {
        if let Some(next) = self.next_run_time {
            self.poll_interval = Some(poll_interval(&self.policy, next, now));
        }
    }
}

/// Commands accepted by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleCommand {
    Enable,
    Disable,
    SetPolicy(Policy),
    Tick,
    /// A fetch started outside of a trigger.
    RunStarted,
    RunFinished,
}

/// What the caller should do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Nothing to do.
    Idle,
    /// Start a fetch run now and report back with `RunFinished`.
    Trigger,
    /// Durable settings changed and should be saved.
    Persist,
}

/// Pure transition function.
///
/// Errors only when a policy cannot produce a next run; the input state is
/// left untouched in that case.
pub fn reduce(
    state: &ScheduleState,
    command: ScheduleCommand,
    now: NaiveDateTime,
) -> Result<(ScheduleState, Signal)> {
    let mut next = state.clone();

    let signal = match command {
        ScheduleCommand::Enable => {
            next.enabled = true;
            next.reschedule(now)?;
            next.last_check_time = Some(now);
            Signal::Persist
        }
        ScheduleCommand::Disable => {
            next.enabled = false;
            next.next_run_time = None;
            next.last_check_time = None;
            next.poll_interval = None;
            Signal::Persist
        }
        ScheduleCommand::SetPolicy(policy) => {
            policy.validate()?;
            next.policy = policy;
            if next.enabled {
                next.reschedule(now)?;
                next.last_check_time = Some(now);
            }
            Signal::Persist
        }
        ScheduleCommand::RunStarted => {
            next.in_flight = true;
            Signal::Idle
        }
        ScheduleCommand::RunFinished => {
            next.in_flight = false;
            next.refresh_poll(now);
            Signal::Idle
        }
        ScheduleCommand::Tick => tick(&mut next, now)?,
    };

    Ok((next, signal))
}

fn tick(state: &mut ScheduleState, now: NaiveDateTime) -> Result<Signal> {
    if !state.enabled {
        return Ok(Signal::Idle);
    }

    let previous_check = state.last_check_time.replace(now);

    if let Some(last) = previous_check {
        if now - last > TimeDelta::seconds(WATCHDOG_GAP_SECS) {
            log::warn!(
                "No schedule check for {}s, recomputing next run",
                (now - last).num_seconds()
            );
            state.reschedule(now)?;
            return Ok(Signal::Idle);
        }
    }

    let Some(next) = state.next_run_time else {
        state.reschedule(now)?;
        return Ok(Signal::Idle);
    };

    if state.policy.is_custom() && next - now > TimeDelta::seconds(CUSTOM_HORIZON_SECS) {
        log::warn!("Custom schedule next run {next} is too far out, recomputing");
        state.reschedule(now)?;
        return Ok(Signal::Idle);
    }

    if now < next {
        state.refresh_poll(now);
        return Ok(Signal::Idle);
    }

    if state.in_flight {
        log::debug!("Scheduled run due at {next} deferred, previous run still in flight");
        state.refresh_poll(now);
        return Ok(Signal::Idle);
    }

    log::info!("Scheduled run due at {next}, triggering");
    state.in_flight = true;
    state.reschedule(now)?;
    Ok(Signal::Trigger)
}

/// Point-in-time view for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleStatus {
    pub enabled: bool,
    pub policy: String,
    pub next_run: Option<NaiveDateTime>,
    pub seconds_until_next: Option<i64>,
    pub poll_seconds: Option<u64>,
    pub in_flight: bool,
}

/// Owns a [`ScheduleState`] and applies commands to it.
#[derive(Debug, Clone)]
pub struct ScheduleDriver {
    state: ScheduleState,
}

impl ScheduleDriver {
    pub fn new(settings: &ScheduleSettings, now: NaiveDateTime) -> Result<Self> {
        Ok(Self {
            state: ScheduleState::from_settings(settings, now)?,
        })
    }

    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    /// Apply one command. On error the state is unchanged.
    pub fn dispatch(&mut self, command: ScheduleCommand, now: NaiveDateTime) -> Result<Signal> {
        let (state, signal) = reduce(&self.state, command, now)?;
        self.state = state;
        Ok(signal)
    }

    pub fn tick(&mut self, now: NaiveDateTime) -> Result<Signal> {
        self.dispatch(ScheduleCommand::Tick, now)
    }

    /// Bring the in-memory state in line with settings saved elsewhere.
    ///
    /// Returns `true` when anything changed.
    pub fn sync(&mut self, settings: &ScheduleSettings, now: NaiveDateTime) -> Result<bool> {
        let mut changed = false;
        if settings.policy != self.state.policy {
            self.dispatch(ScheduleCommand::SetPolicy(settings.policy), now)?;
            changed = true;
        }
        if settings.enabled != self.state.enabled {
            let command = if settings.enabled {
                ScheduleCommand::Enable
            } else {
                ScheduleCommand::Disable
            };
            self.dispatch(command, now)?;
            changed = true;
        }
        Ok(changed)
    }

    /// Suggested sleep before the next tick.
    pub fn poll_hint(&self) -> Duration {
        self.state
            .poll_interval
            .unwrap_or(crate::schedule::recurrence::MAX_POLL)
    }

    pub fn status(&self, now: NaiveDateTime) -> ScheduleStatus {
        ScheduleStatus {
            enabled: self.state.enabled,
            policy: self.state.policy.to_string(),
            next_run: self.state.next_run_time,
            seconds_until_next: self
                .state
                .next_run_time
                .map(|next| (next - now).num_seconds().max(0)),
            poll_seconds: self.state.poll_interval.map(|d| d.as_secs()),
            in_flight: self.state.in_flight,
        }
    }
}
