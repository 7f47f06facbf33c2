//! Local filesystem storage implementation.
//!
//! Every write goes to a temporary sibling first and is renamed into place,
//! so an interrupted process never leaves a half-written file behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{
    FetchAttemptRecord, FetchStatusRecord, ScheduleSettings, TabularDataset, truncate_log,
};
use crate::storage::{DataStore, SavedFile, StoredFile};

const DOWNLOADS_DIR: &str = "downloads";
const HISTORY_KEY: &str = "logs/fetch_history.json";
const STATUS_KEY: &str = "logs/fetch_status.json";
const SCHEDULE_KEY: &str = "config/schedule_config.json";

/// Local filesystem storage backend.
#[derive(Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
    log_lock: Arc<Mutex<()>>,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            log_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Key of the CSV snapshot for a file identity.
    fn dataset_key(identity: &str) -> Result<String> {
        if identity.is_empty()
            || identity.contains(['/', '\\'])
            || identity.contains("..")
        {
            return Err(AppError::validation(format!(
                "Invalid file identity: {identity:?}"
            )));
        }
        Ok(format!("{DOWNLOADS_DIR}/{identity}.csv"))
    }

    /// Full path of the persisted CSV for `identity`.
    pub fn dataset_path(&self, identity: &str) -> Result<PathBuf> {
        Ok(self.path(&Self::dataset_key(identity)?))
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let write = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, &path).await
        };

        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::persistence(&path, e));
        }
        Ok(path)
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<PathBuf> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Read a JSON log, starting over if it is unreadable.
    async fn read_log<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        match self.read_json::<Vec<T>>(key).await {
            Ok(entries) => Ok(entries.unwrap_or_default()),
            Err(AppError::Json(e)) => {
                log::warn!("Log {} is corrupted ({}), starting a new one", key, e);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Append entries to a capped JSON log.
    async fn append_log<T: Serialize + DeserializeOwned + Clone>(
        &self,
        key: &str,
        new_entries: &[T],
    ) -> Result<usize> {
        let _guard = self.log_lock.lock().await;
        let mut entries: Vec<T> = self.read_log(key).await?;
        entries.extend_from_slice(new_entries);
        truncate_log(&mut entries);
        self.write_json(key, &entries).await?;
        Ok(entries.len())
    }

    /// Load persisted schedule settings, or defaults when none are stored.
    pub async fn load_schedule(&self) -> Result<ScheduleSettings> {
        match self.read_json::<ScheduleSettings>(SCHEDULE_KEY).await {
            Ok(Some(settings)) => Ok(settings),
            Ok(None) => Ok(ScheduleSettings::default()),
            Err(AppError::Json(e)) => {
                log::error!("Failed to load schedule configuration: {}", e);
                Ok(ScheduleSettings::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Persist schedule settings, stamping the update time.
    pub async fn save_schedule(&self, settings: &ScheduleSettings) -> Result<()> {
        let mut settings = settings.clone();
        settings.updated_at = Some(Local::now());
        self.write_json(SCHEDULE_KEY, &settings).await?;
        log::info!("Saved schedule configuration");
        Ok(())
    }
}

#[async_trait]
impl DataStore for LocalStorage {
    async fn load_dataset(&self, identity: &str) -> Result<Option<TabularDataset>> {
        let key = Self::dataset_key(identity)?;
        match self.read_bytes(&key).await? {
            Some(bytes) => Ok(Some(TabularDataset::from_csv(&bytes, &key)?)),
            None => Ok(None),
        }
    }

    async fn save_dataset(&self, identity: &str, dataset: &TabularDataset) -> Result<SavedFile> {
        let key = Self::dataset_key(identity)?;
        let bytes = dataset.to_csv_bytes()?;
        let path = self.write_bytes(&key, &bytes).await?;
        Ok(SavedFile {
            identity: identity.to_string(),
            path,
            bytes: bytes.len(),
            sha256: hex::encode(Sha256::digest(&bytes)),
        })
    }

    async fn list_datasets(&self) -> Result<Vec<StoredFile>> {
        let dir = self.path(DOWNLOADS_DIR);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let Some(identity) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let metadata = entry.metadata().await?;
            files.push(StoredFile {
                identity: identity.to_string(),
                size: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Local>::from),
                path,
            });
        }
        files.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(files)
    }

    async fn append_attempt(&self, record: FetchAttemptRecord) -> Result<usize> {
        self.append_log(HISTORY_KEY, &[record]).await
    }

    async fn load_attempts(&self) -> Result<Vec<FetchAttemptRecord>> {
        self.read_log(HISTORY_KEY).await
    }

    async fn append_statuses(&self, records: &[FetchStatusRecord]) -> Result<usize> {
        self.append_log(STATUS_KEY, records).await
    }

    async fn load_statuses(&self) -> Result<Vec<FetchStatusRecord>> {
        self.read_log(STATUS_KEY).await
    }
}
