// src/services/links.rs

//! Data file link discovery.
//!
//! Fetches a page and collects every anchor whose href mentions a CSV or
//! Excel file, including query-string download endpoints.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::DiscoveredLink;
use crate::utils::http::{HttpClient, fetch_ok};
use crate::utils::resolve_url;

/// Case-insensitive match for `.csv`, `.xls` and `.xlsx` anywhere in an href.
static FILE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(?:csv|xlsx?)").expect("valid file link pattern"));

/// Whether an href points at a data file.
pub fn is_data_file_link(href: &str) -> bool {
    FILE_LINK.is_match(href)
}

/// Service for discovering data file links on source pages.
#[derive(Clone)]
pub struct LinkDiscoverer {
    client: Arc<dyn HttpClient>,
}

impl LinkDiscoverer {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }

    /// Fetch `page_url` and return the data file links it contains.
    ///
    /// An empty list is a successful discovery.
    pub async fn discover(&self, page_url: &str) -> Result<Vec<DiscoveredLink>> {
        let body = fetch_ok(self.client.as_ref(), page_url).await?;
        let html = String::from_utf8_lossy(&body);
        let links = extract_links(&html, page_url)?;
        log::debug!("Found {} data file links on {}", links.len(), page_url);
        Ok(links)
    }
}

/// Collect data file links from an HTML document, resolving relative hrefs.
pub fn extract_links(html: &str, page_url: &str) -> Result<Vec<DiscoveredLink>> {
    let base_url = Url::parse(page_url)?;
    let document = Html::parse_document(html);
    let anchor_sel = parse_selector("a[href]")?;

    let links = document
        .select(&anchor_sel)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?;
            if !is_data_file_link(href) {
                return None;
            }
            let display_text: String = anchor
                .text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect();
            Some(DiscoveredLink {
                target_url: resolve_url(&base_url, href.trim()),
                origin_page_url: page_url.to_string(),
                display_text,
            })
        })
        .collect();

    Ok(links)
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::StubClient;

    const PAGE: &str = "https://www.health.govt.nz/providers/public-hospitals";

    #[test]
    fn test_file_link_pattern() {
        assert!(is_data_file_link("/files/list.csv"));
        assert!(is_data_file_link("/files/LIST.XLSX"));
        assert!(is_data_file_link("/files/list.xls"));
        assert!(is_data_file_link("/download?file=hospitals.csv&v=2"));
        assert!(!is_data_file_link("/files/list.pdf"));
        assert!(!is_data_file_link("/about"));
    }

    #[test]
    fn test_extract_links_resolves_and_filters() {
        let html = r#"
            <html><body>
              <a href="/system/files/public-hospitals.xlsx"> Public <b>hospitals</b> </a>
              <a href="report.pdf">Report</a>
              <a href="https://cdn.example.org/data/list.CSV">CSV</a>
              <a>No href</a>
            </body></html>
        "#;
        let links = extract_links(html, PAGE).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(
            links[0].target_url,
            "https://www.health.govt.nz/system/files/public-hospitals.xlsx"
        );
        assert_eq!(links[0].display_text, "Publichospitals");
        assert_eq!(links[0].origin_page_url, PAGE);
        assert_eq!(links[1].target_url, "https://cdn.example.org/data/list.CSV");
    }

    #[test]
    fn test_extract_links_empty_page() {
        let links = extract_links("<html></html>", PAGE).unwrap();
        assert!(links.is_empty());
    }

    #[tokio::test]
    async fn test_discover_non_success_status_is_error() {
        let client = Arc::new(StubClient::new().with(PAGE, 503, b""));
        let discoverer = LinkDiscoverer::new(client);
        let err = discoverer.discover(PAGE).await.unwrap_err();
        assert!(matches!(err, AppError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_discover_success() {
        let body = br#"<a href="files/a.csv">A</a><a href="files/b.xls">B</a>"#;
        let client = Arc::new(StubClient::new().with(PAGE, 200, body));
        let discoverer = LinkDiscoverer::new(client);
        let links = discoverer.discover(PAGE).await.unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(
            links[0].target_url,
            "https://www.health.govt.nz/providers/files/a.csv"
        );
    }
}
