use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hospital_fetcher::error::Result;
use hospital_fetcher::storage::LocalStorage;
use hospital_fetcher::utils::http::{HttpClient, HttpResponse};
use tempfile::TempDir;

pub const NZ_PUBLIC: &str = "https://www.health.govt.nz/providers/public-hospitals";
pub const NZ_PRIVATE: &str = "https://www.health.govt.nz/providers/private-hospitals";
pub const AU_DECLARED: &str = "https://www.health.gov.au/resources/list-of-declared-hospitals";

/// Serves canned bodies that tests can swap between runs.
#[derive(Default)]
pub struct FakeWeb {
    pages: Mutex<HashMap<String, (u16, Vec<u8>)>>,
}

impl FakeWeb {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, status: u16, body: &[u8]) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.to_vec()));
    }

    pub fn serve_links(&self, page_url: &str, hrefs: &[&str]) {
        let body: String = hrefs
            .iter()
            .map(|href| format!(r#"<p><a href="{href}">Download</a></p>"#))
            .collect();
        self.serve(page_url, 200, format!("<html><body>{body}</body></html>").as_bytes());
    }
}

#[async_trait]
impl HttpClient for FakeWeb {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let pages = self.pages.lock().unwrap();
        Ok(match pages.get(url) {
            Some((status, body)) => HttpResponse {
                status: *status,
                body: body.clone(),
            },
            None => HttpResponse {
                status: 404,
                body: Vec::new(),
            },
        })
    }
}

pub fn temp_storage() -> (TempDir, Arc<LocalStorage>) {
    let dir = TempDir::new().expect("create temp dir");
    let storage = Arc::new(LocalStorage::new(dir.path().join("data")));
    (dir, storage)
}
