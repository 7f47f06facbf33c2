// src/models/mod.rs

//! Domain models for the fetcher application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod dataset;
mod schedule;
mod source;
mod stats;

// Re-export all public types
pub use config::{Config, FetcherConfig, LoggingConfig, PathsConfig};
pub use dataset::{Cell, ColumnKind, DATETIME_FORMAT, FileFormat, TabularDataset, is_missing_token};
pub use schedule::{MAX_CUSTOM_MINUTES, MAX_MONTH_DAY, Policy, ScheduleSettings};
pub use source::{DiscoveredLink, NamingRule, Page, Source, file_identity};
pub use stats::{
    AttemptStats, FetchAttemptRecord, FetchStatusRecord, HistorySummary, LOG_CAPACITY, PageStatus,
    truncate_log,
};
