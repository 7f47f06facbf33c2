//! Fetch attempt accounting and log records.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Maximum number of records kept in each fetch log.
pub const LOG_CAPACITY: usize = 1000;

/// Aggregate counts for one orchestrated run.
///
/// `successful` counts discovered links, `failed` counts failed page requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptStats {
    pub total_attempts: usize,
    pub successful: usize,
    pub failed: usize,
}

impl AttemptStats {
    /// Fraction of page requests that did not fail.
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            return 0.0;
        }
        (self.total_attempts - self.failed.min(self.total_attempts)) as f64
            / self.total_attempts as f64
    }
}

/// One entry of the fetch attempt log, written once per orchestrated run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchAttemptRecord {
    pub timestamp: DateTime<Local>,
    #[serde(flatten)]
    pub stats: AttemptStats,
}

impl FetchAttemptRecord {
    pub fn new(stats: AttemptStats) -> Self {
        Self {
            timestamp: Local::now(),
            stats,
        }
    }
}

/// Outcome of discovery for a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Success,
    Failed,
    Error,
}

/// Per-page discovery status record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchStatusRecord {
    pub timestamp: DateTime<Local>,
    pub source: String,
    pub url: String,
    pub status: PageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Totals over a slice of attempt records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySummary {
    pub runs: usize,
    pub totals: AttemptStats,
    pub last_run: Option<DateTime<Local>>,
}

impl HistorySummary {
    pub fn from_records(records: &[FetchAttemptRecord]) -> Self {
        let mut summary = Self {
            runs: records.len(),
            ..Self::default()
        };
        for record in records {
            summary.totals.total_attempts += record.stats.total_attempts;
            summary.totals.successful += record.stats.successful;
            summary.totals.failed += record.stats.failed;
        }
        summary.last_run = records.iter().map(|r| r.timestamp).max();
        summary
    }
}

/// Keep only the newest `LOG_CAPACITY` entries.
pub fn truncate_log<T>(entries: &mut Vec<T>) {
    if entries.len() > LOG_CAPACITY {
        let excess = entries.len() - LOG_CAPACITY;
        entries.drain(..excess);
    }
}
