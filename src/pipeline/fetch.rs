// src/pipeline/fetch.rs

//! Fetch pipeline.
//!
//! One run discovers links on every active page, records per-page status
//! and run totals, then downloads each link and persists changed files.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use futures::stream::{self, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{
    AttemptStats, Config, DiscoveredLink, FetchAttemptRecord, FetchStatusRecord, Page,
    PageStatus, Source,
};
use crate::services::{FileRetriever, LinkDiscoverer, RetrieveOutcome};
use crate::storage::DataStore;
use crate::utils::http::HttpClient;
use crate::utils::log as console;

/// Summary of one orchestrated run.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    /// Links found per source, in page order.
    pub links: BTreeMap<String, Vec<DiscoveredLink>>,
    pub stats: AttemptStats,
    /// Identities written per source. Every processed source has an entry.
    pub downloaded: BTreeMap<String, Vec<String>>,
    /// Identities whose content matched the stored snapshot.
    pub unchanged: BTreeMap<String, Vec<String>>,
    pub page_statuses: Vec<FetchStatusRecord>,
    pub download_failures: usize,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
}

impl FetchReport {
    pub fn link_count(&self) -> usize {
        self.links.values().map(Vec::len).sum()
    }

    pub fn downloaded_count(&self) -> usize {
        self.downloaded.values().map(Vec::len).sum()
    }
}

/// Coordinates discovery, download and persistence across sources.
pub struct FetchOrchestrator {
    discoverer: LinkDiscoverer,
    retriever: FileRetriever,
    store: Arc<dyn DataStore>,
    max_concurrent: usize,
    request_delay: Duration,
}

impl FetchOrchestrator {
    pub fn new(config: &Config, client: Arc<dyn HttpClient>, store: Arc<dyn DataStore>) -> Self {
        Self {
            discoverer: LinkDiscoverer::new(client.clone()),
            retriever: FileRetriever::new(client, store.clone(), config.naming_rules.clone()),
            store,
            max_concurrent: config.fetcher.max_concurrent.max(1),
            request_delay: Duration::from_millis(config.fetcher.request_delay_ms),
        }
    }

    /// Run discovery then downloads for `sources`.
    ///
    /// Failures of single pages or files are counted and logged; they never
    /// abort the run. Log write failures are logged and otherwise ignored.
    pub async fn run(&self, sources: &[Source]) -> FetchReport {
        let mut report = FetchReport {
            started_at: Some(Local::now()),
            ..FetchReport::default()
        };

        self.discover_all(sources, &mut report).await;

        let record = FetchAttemptRecord::new(report.stats);
        if let Err(e) = self.store.append_attempt(record).await {
            log::error!("Failed to write fetch history: {e}");
        }
        if let Err(e) = self.store.append_statuses(&report.page_statuses).await {
            log::error!("Failed to write page status log: {e}");
        }

        self.download_all(&mut report).await;

        report.finished_at = Some(Local::now());
        report
    }

    async fn discover_all(&self, sources: &[Source], report: &mut FetchReport) {
        let page_jobs: Vec<(&str, &Page)> = sources
            .iter()
            .flat_map(|source| {
                source
                    .active_pages()
                    .map(move |page| (source.name.as_str(), page))
            })
            .collect();

        for source in sources {
            report.links.entry(source.name.clone()).or_default();
        }

        let page_futures: Vec<_> = page_jobs
            .into_iter()
            .map(|(source, page)| async move {
                let result = self.discoverer.discover(&page.url).await;
                (source, page, result)
            })
            .collect();
        let mut page_stream = stream::iter(page_futures).buffered(self.max_concurrent);

        while let Some((source, page, result)) = page_stream.next().await {
            let url = page.url.as_str();
            report.stats.total_attempts += 1;
            let (status, error) = match result {
                Ok(links) => {
                    report.stats.successful += links.len();
                    log::info!("{}: {} data file links on {url}", page.key(source), links.len());
                    report
                        .links
                        .entry(source.to_string())
                        .or_default()
                        .extend(links);
                    (PageStatus::Success, None)
                }
                Err(e) => {
                    report.stats.failed += 1;
                    log::warn!("{}: failed to fetch {url}: {e}", page.key(source));
                    (page_status_for(&e), Some(e.to_string()))
                }
            };
            report.page_statuses.push(FetchStatusRecord {
                timestamp: Local::now(),
                source: source.to_string(),
                url: url.to_string(),
                status,
                error,
            });

            if !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
        }
    }

    async fn download_all(&self, report: &mut FetchReport) {
        let download_jobs: Vec<(&str, &DiscoveredLink)> = report
            .links
            .iter()
            .flat_map(|(source, links)| links.iter().map(move |link| (source.as_str(), link)))
            .collect();

        let mut downloaded: BTreeMap<String, Vec<String>> = report
            .links
            .keys()
            .map(|source| (source.clone(), Vec::new()))
            .collect();
        let mut unchanged = downloaded.clone();
        let mut failures = 0;

        let download_futures: Vec<_> = download_jobs
            .into_iter()
            .map(|(source, link)| async move {
                let result = self.retriever.retrieve_and_persist(link, source).await;
                (source, link, result)
            })
            .collect();
        let mut download_stream = stream::iter(download_futures).buffer_unordered(self.max_concurrent);

        while let Some((source, link, result)) = download_stream.next().await {
            match result {
                Ok(outcome) => {
                    let bucket = match outcome {
                        RetrieveOutcome::Saved(_) => &mut downloaded,
                        RetrieveOutcome::Unchanged { .. } => &mut unchanged,
                    };
                    let names = bucket.entry(source.to_string()).or_default();
                    let identity = outcome.identity().to_string();
                    if !names.contains(&identity) {
                        names.push(identity);
                    }
                }
                Err(e) => {
                    failures += 1;
                    log::error!("{source}: failed to process {}: {e}", link.target_url);
                }
            }

            if !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
        }
        drop(download_stream);

        for names in downloaded.values_mut().chain(unchanged.values_mut()) {
            names.sort();
        }
        report.downloaded = downloaded;
        report.unchanged = unchanged;
        report.download_failures = failures;
    }
}

/// Non-success HTTP responses are `failed`; anything else is an `error`.
fn page_status_for(error: &AppError) -> PageStatus {
    match error {
        AppError::Status { .. } => PageStatus::Failed,
        _ => PageStatus::Error,
    }
}

/// Run one fetch over `sources` and print a console summary.
pub async fn run_fetch(
    config: &Config,
    client: Arc<dyn HttpClient>,
    store: Arc<dyn DataStore>,
    sources: &[Source],
) -> Result<FetchReport> {
    if sources.is_empty() {
        return Err(AppError::config("no active sources to fetch"));
    }

    console::header("Fetching hospital registries");
    let page_count: usize = sources.iter().map(|s| s.active_pages().count()).sum();
    console::info(&format!(
        "Checking {} pages across {} sources",
        page_count,
        sources.len()
    ));

    let orchestrator = FetchOrchestrator::new(config, client, store);
    let report = orchestrator.run(sources).await;

    if config.logging.show_progress {
        for (source, names) in &report.downloaded {
            for name in names {
                console::sub_item(&format!("{source}: saved {name}"));
            }
        }
        for (source, names) in &report.unchanged {
            for name in names {
                console::sub_item(&format!("{source}: {name} unchanged"));
            }
        }
    }

    console::summary(
        "Fetch",
        &[
            ("Pages checked", report.stats.total_attempts.to_string()),
            ("Links found", report.stats.successful.to_string()),
            ("Page failures", report.stats.failed.to_string()),
            ("Files saved", report.downloaded_count().to_string()),
            ("Download failures", report.download_failures.to_string()),
        ],
    );
    if report.downloaded_count() > 0 {
        console::success("Fetch complete with updated files");
    } else {
        console::success("Fetch complete, no changes");
    }

    Ok(report)
}
