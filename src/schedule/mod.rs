//! Recurring fetch scheduling.
//!
//! - `recurrence`: next-run times and poll hints per policy
//! - `driver`: the tick-driven state machine deciding when to fetch

pub mod driver;
pub mod recurrence;

pub use driver::{ScheduleCommand, ScheduleDriver, ScheduleState, ScheduleStatus, Signal, reduce};
pub use recurrence::{next_run, poll_interval};
