// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::{AppError, Result};
use crate::models::FetcherConfig;

/// A fetched response: status code and raw body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal GET client used by discovery and downloads.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

/// GET `url` and return the body, turning non-2xx statuses into errors.
pub async fn fetch_ok(client: &dyn HttpClient, url: &str) -> Result<Vec<u8>> {
    let response = client.get(url).await?;
    if !response.is_success() {
        return Err(AppError::Status {
            url: url.to_string(),
            status: response.status,
        });
    }
    Ok(response.body)
}

/// `reqwest`-backed client carrying the configured header set and timeout.
#[derive(Clone)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        Ok(Self {
            inner: create_async_client(config)?,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self.inner.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &FetcherConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .default_headers(header_map(config)?)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

fn header_map(config: &FetcherConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AppError::config(format!("Invalid header name {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| AppError::config(format!("Invalid value for header {name}: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_map_from_defaults() {
        let config = FetcherConfig::default();
        let headers = header_map(&config).unwrap();
        assert!(headers.contains_key("user-agent"));
        assert_eq!(headers.len(), config.headers.len());
    }

    #[test]
    fn test_header_map_rejects_bad_name() {
        let mut config = FetcherConfig::default();
        config.headers.insert("bad header".into(), "x".into());
        assert!(matches!(header_map(&config), Err(AppError::Config(_))));
    }

    #[test]
    fn test_response_success_range() {
        let ok = HttpResponse {
            status: 204,
            body: Vec::new(),
        };
        let redirect = HttpResponse {
            status: 302,
            body: Vec::new(),
        };
        assert!(ok.is_success());
        assert!(!redirect.is_success());
    }

    #[test]
    fn test_create_client() {
        assert!(create_async_client(&FetcherConfig::default()).is_ok());
    }
}
