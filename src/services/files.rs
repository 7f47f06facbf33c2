// src/services/files.rs

//! File retrieval service.
//!
//! Downloads a discovered data file, parses it, and replaces the stored
//! snapshot only when the content differs from what is on disk.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::models::{DiscoveredLink, FileFormat, NamingRule, TabularDataset, file_identity};
use crate::pipeline::diff::DatasetDiffer;
use crate::storage::{DataStore, SavedFile};
use crate::utils::http::{HttpClient, fetch_ok};

/// What happened to a single downloaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrieveOutcome {
    /// Content differed (or nothing was stored yet) and was written.
    Saved(SavedFile),
    /// Content matched the stored snapshot.
    Unchanged { identity: String },
}

impl RetrieveOutcome {
    pub fn identity(&self) -> &str {
        match self {
            RetrieveOutcome::Saved(saved) => &saved.identity,
            RetrieveOutcome::Unchanged { identity } => identity,
        }
    }
}

/// Service that downloads, compares and persists data files.
pub struct FileRetriever {
    client: Arc<dyn HttpClient>,
    store: Arc<dyn DataStore>,
    naming_rules: Vec<NamingRule>,
    differ: DatasetDiffer,
    identity_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileRetriever {
    pub fn new(
        client: Arc<dyn HttpClient>,
        store: Arc<dyn DataStore>,
        naming_rules: Vec<NamingRule>,
    ) -> Self {
        Self {
            client,
            store,
            naming_rules,
            differ: DatasetDiffer::new(),
            identity_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Identity the file from `link` is stored under.
    pub fn identity_for(&self, link: &DiscoveredLink, source: &str) -> String {
        file_identity(&self.naming_rules, source, &link.origin_page_url)
    }

    /// Download `link`, then save it unless it equals the stored snapshot.
    ///
    /// Network and parse failures leave storage untouched. An unreadable
    /// stored snapshot is treated as absent, so the new file replaces it.
    pub async fn retrieve_and_persist(
        &self,
        link: &DiscoveredLink,
        source: &str,
    ) -> Result<RetrieveOutcome> {
        log::info!("Downloading {}", link.target_url);
        let bytes = fetch_ok(self.client.as_ref(), &link.target_url).await?;
        let format = FileFormat::from_url(&link.target_url);
        let dataset = TabularDataset::parse(&bytes, format, &link.target_url)?;

        let identity = self.identity_for(link, source);
        let lock = self.lock_for(&identity);
        let _guard = lock.lock().await;

        let existing = match self.store.load_dataset(&identity).await {
            Ok(existing) => existing,
            Err(e) => {
                log::warn!("Stored snapshot for {identity} is unreadable, replacing it: {e}");
                None
            }
        };

        if self.differ.is_equal(&dataset, existing.as_ref()) {
            log::info!("{identity} unchanged, skipping save");
            return Ok(RetrieveOutcome::Unchanged { identity });
        }

        let saved = self.store.save_dataset(&identity, &dataset).await?;
        log::info!(
            "Saved {} ({} rows, {} bytes)",
            saved.path.display(),
            dataset.row_count(),
            saved.bytes
        );
        Ok(RetrieveOutcome::Saved(saved))
    }

    /// One async lock per identity so concurrent writers never interleave.
    fn lock_for(&self, identity: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .identity_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::Cell;
    use crate::storage::LocalStorage;
    use crate::utils::testing::StubClient;
    use tempfile::TempDir;

    const PAGE: &str = "https://www.health.govt.nz/providers/public-hospitals";
    const FILE: &str = "https://www.health.govt.nz/files/hospitals.csv";

    fn link() -> DiscoveredLink {
        DiscoveredLink {
            target_url: FILE.to_string(),
            origin_page_url: PAGE.to_string(),
            display_text: "Hospitals".to_string(),
        }
    }

    fn rules() -> Vec<NamingRule> {
        vec![NamingRule::new("NZ", "public-hospitals", "NZ_Public_Hospitals")]
    }

    fn setup(body: &[u8]) -> (TempDir, Arc<StubClient>, Arc<LocalStorage>, FileRetriever) {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(StubClient::new().with(FILE, 200, body));
        let store = Arc::new(LocalStorage::new(dir.path()));
        let retriever = FileRetriever::new(client.clone(), store.clone(), rules());
        (dir, client, store, retriever)
    }

    #[tokio::test]
    async fn test_first_download_is_saved() {
        let (_dir, _client, store, retriever) = setup(b"Name,Beds\nA,10\nB,20\n");

        let outcome = retriever.retrieve_and_persist(&link(), "NZ").await.unwrap();
        assert!(matches!(outcome, RetrieveOutcome::Saved(_)));
        assert_eq!(outcome.identity(), "NZ_Public_Hospitals");

        let stored = store
            .load_dataset("NZ_Public_Hospitals")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.row_count(), 2);
    }

    #[tokio::test]
    async fn test_identical_download_is_skipped() {
        let (_dir, _client, store, retriever) = setup(b"Name,Beds\nA,10\nB,20\n");
        retriever.retrieve_and_persist(&link(), "NZ").await.unwrap();
        let path = store.dataset_path("NZ_Public_Hospitals").unwrap();
        let before = std::fs::read(&path).unwrap();

        let outcome = retriever.retrieve_and_persist(&link(), "NZ").await.unwrap();
        assert_eq!(
            outcome,
            RetrieveOutcome::Unchanged {
                identity: "NZ_Public_Hospitals".to_string()
            }
        );
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_changed_download_replaces_snapshot() {
        let (_dir, _client, store, retriever) = setup(b"Name,Beds\nA,10\nB,25\n");
        let old = TabularDataset::new(
            vec!["Name".into(), "Beds".into()],
            vec![
                vec![Cell::from("A"), Cell::from(10.0)],
                vec![Cell::from("B"), Cell::from(20.0)],
            ],
        );
        store.save_dataset("NZ_Public_Hospitals", &old).await.unwrap();

        let outcome = retriever.retrieve_and_persist(&link(), "NZ").await.unwrap();
        assert!(matches!(outcome, RetrieveOutcome::Saved(_)));

        let stored = store
            .load_dataset("NZ_Public_Hospitals")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.rows[1][1], Cell::Number(25.0));
    }

    #[tokio::test]
    async fn test_identical_workbook_is_skipped() {
        const WORKBOOK: &str = "https://www.health.govt.nz/files/hospitals.xlsx";
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Facility Code").unwrap();
        sheet.write_string(0, 1, "Name").unwrap();
        sheet.write_string(1, 0, "0123").unwrap();
        sheet.write_string(1, 1, "Auckland City").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let dir = TempDir::new().unwrap();
        let client = Arc::new(StubClient::new().with(WORKBOOK, 200, &bytes));
        let store = Arc::new(LocalStorage::new(dir.path()));
        let retriever = FileRetriever::new(client, store, rules());
        let link = DiscoveredLink {
            target_url: WORKBOOK.to_string(),
            ..link()
        };

        let first = retriever.retrieve_and_persist(&link, "NZ").await.unwrap();
        assert!(matches!(first, RetrieveOutcome::Saved(_)));
        let second = retriever.retrieve_and_persist(&link, "NZ").await.unwrap();
        assert!(matches!(second, RetrieveOutcome::Unchanged { .. }));
    }

    #[tokio::test]
    async fn test_download_failure_leaves_storage_untouched() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(StubClient::new().with(FILE, 500, b""));
        let store = Arc::new(LocalStorage::new(dir.path()));
        let retriever = FileRetriever::new(client, store.clone(), rules());

        let err = retriever.retrieve_and_persist(&link(), "NZ").await.unwrap_err();
        assert!(matches!(err, AppError::Status { status: 500, .. }));
        assert!(store.list_datasets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_download_is_error() {
        let (_dir, _client, store, retriever) = setup(b"Name\nA,extra\n");
        let err = retriever.retrieve_and_persist(&link(), "NZ").await.unwrap_err();
        assert!(matches!(err, AppError::Parse { .. }));
        assert!(store.list_datasets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_replaced() {
        let (_dir, _client, store, retriever) = setup(b"Name,Beds\nA,10\n");
        let path = store.dataset_path("NZ_Public_Hospitals").unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"Name\nA,1,2,3\n").unwrap();

        let outcome = retriever.retrieve_and_persist(&link(), "NZ").await.unwrap();
        assert!(matches!(outcome, RetrieveOutcome::Saved(_)));
    }

    #[tokio::test]
    async fn test_concurrent_same_identity_writes_serialize() {
        let (_dir, client, store, retriever) = setup(b"Name,Beds\nA,10\n");
        let retriever = Arc::new(retriever);

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let retriever = retriever.clone();
                tokio::spawn(async move { retriever.retrieve_and_persist(&link(), "NZ").await })
            })
            .collect();

        let mut saved = 0;
        for task in tasks {
            if let RetrieveOutcome::Saved(_) = task.await.unwrap().unwrap() {
                saved += 1;
            }
        }
        assert_eq!(saved, 1);
        assert_eq!(client.request_count(FILE), 4);
        assert_eq!(store.list_datasets().await.unwrap().len(), 1);
    }
}
