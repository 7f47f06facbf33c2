//! Storage abstractions for persisted datasets and fetch logs.
//!
//! ## Directory Structure
//!
//! ```text
//! {data_dir}/
//! ├── downloads/
//! │   └── {identity}.csv         # Current snapshot per file identity
//! ├── logs/
//! │   ├── fetch_history.json     # One record per orchestrated run
//! │   └── fetch_status.json      # One record per page per run
//! └── config/
//!     └── schedule_config.json   # Durable schedule intent
//! ```
//!
//! Both logs keep the newest 1000 entries.

pub mod local;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Local};

use crate::error::Result;
use crate::models::{FetchAttemptRecord, FetchStatusRecord, TabularDataset};

// Re-export for convenience
pub use local::LocalStorage;

/// Metadata about a dataset write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub identity: String,
    pub path: PathBuf,
    pub bytes: usize,
    /// Hex SHA-256 of the written CSV
    pub sha256: String,
}

/// A dataset currently on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub identity: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Local>>,
}

/// Trait for dataset and fetch-log storage backends.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Load the persisted dataset for `identity`, if any.
    async fn load_dataset(&self, identity: &str) -> Result<Option<TabularDataset>>;

    /// Replace the persisted dataset for `identity` atomically.
    async fn save_dataset(&self, identity: &str, dataset: &TabularDataset) -> Result<SavedFile>;

    /// List persisted datasets sorted by identity.
    async fn list_datasets(&self) -> Result<Vec<StoredFile>>;

    /// Append a run record, returning the number of records kept.
    async fn append_attempt(&self, record: FetchAttemptRecord) -> Result<usize>;

    /// Load the run records, oldest first.
    async fn load_attempts(&self) -> Result<Vec<FetchAttemptRecord>>;

    /// Append per-page status records.
    async fn append_statuses(&self, records: &[FetchStatusRecord]) -> Result<usize>;

    /// Load per-page status records, oldest first.
    async fn load_statuses(&self) -> Result<Vec<FetchStatusRecord>>;
}
