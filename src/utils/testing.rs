//! Canned HTTP responses for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::utils::http::{HttpClient, HttpResponse};

#[derive(Default)]
pub struct StubClient {
    responses: HashMap<String, Option<HttpResponse>>,
    pub requests: Mutex<Vec<String>>,
}

impl StubClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, status: u16, body: &[u8]) -> Self {
        self.responses.insert(
            url.to_string(),
            Some(HttpResponse {
                status,
                body: body.to_vec(),
            }),
        );
        self
    }

    /// Simulate a transport failure such as a timeout.
    pub fn with_timeout(mut self, url: &str) -> Self {
        self.responses.insert(url.to_string(), None);
        self
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .map(|r| r.iter().filter(|u| u.as_str() == url).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl HttpClient for StubClient {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        match self.responses.get(url) {
            Some(Some(response)) => Ok(response.clone()),
            Some(None) => Err(AppError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("timed out fetching {url}"),
            ))),
            None => Ok(HttpResponse {
                status: 404,
                body: Vec::new(),
            }),
        }
    }
}
