//! Application configuration structures.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{NamingRule, Source};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP behavior settings
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Data providers and the pages they publish
    #[serde(default = "defaults::sources")]
    pub sources: Vec<Source>,

    /// Canonical file identities for known pages
    #[serde(default = "defaults::naming_rules")]
    pub naming_rules: Vec<NamingRule>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration, using defaults only when the file does not exist.
    ///
    /// A file that exists but cannot be parsed is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::warn!("Config not found at {:?}. Using defaults.", path);
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetcher.user_agent().is_none_or(|ua| ua.trim().is_empty()) {
            return Err(AppError::validation("fetcher.headers has no user-agent"));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(AppError::validation("fetcher.timeout_secs must be > 0"));
        }
        if self.fetcher.max_concurrent == 0 {
            return Err(AppError::validation("fetcher.max_concurrent must be > 0"));
        }
        if self.sources.is_empty() {
            return Err(AppError::validation("No sources defined"));
        }
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(AppError::validation("Source with empty name"));
            }
            if source.pages.is_empty() {
                return Err(AppError::validation(format!(
                    "Source {} has no pages",
                    source.name
                )));
            }
            for page in &source.pages {
                url::Url::parse(&page.url).map_err(|e| {
                    AppError::validation(format!("Invalid page URL {}: {}", page.url, e))
                })?;
            }
        }
        Ok(())
    }

    /// Sources restricted to enabled pages, optionally filtered by name.
    ///
    /// Sources left without any active page are dropped.
    pub fn active_sources(&self, only: &[String]) -> Vec<Source> {
        self.sources
            .iter()
            .filter(|s| only.is_empty() || only.iter().any(|o| o.eq_ignore_ascii_case(&s.name)))
            .map(|s| Source {
                name: s.name.clone(),
                pages: s.active_pages().cloned().collect(),
            })
            .filter(|s| !s.pages.is_empty())
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetcher: FetcherConfig::default(),
            paths: PathsConfig::default(),
            logging: LoggingConfig::default(),
            sources: defaults::sources(),
            naming_rules: defaults::naming_rules(),
        }
    }
}

/// HTTP client behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum concurrent requests
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Delay after each completed request in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Headers sent with every request
    #[serde(default = "defaults::headers")]
    pub headers: BTreeMap<String, String>,
}

impl FetcherConfig {
    pub fn user_agent(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("user-agent"))
            .map(|(_, v)| v.as_str())
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
            request_delay_ms: defaults::request_delay(),
            headers: defaults::headers(),
        }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root directory for downloads, logs and schedule settings
    #[serde(default = "defaults::data_dir")]
    pub data_dir: PathBuf,
}

impl PathsConfig {
    /// Resolve the data directory relative to `base` unless absolute.
    pub fn data_dir_in(&self, base: &Path) -> PathBuf {
        if self.data_dir.is_absolute() {
            self.data_dir.clone()
        } else {
            base.join(&self.data_dir)
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,

    /// Print per-file details after a run
    #[serde(default = "defaults::show_progress")]
    pub show_progress: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
            show_progress: defaults::show_progress(),
        }
    }
}

mod defaults {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use crate::models::{NamingRule, Source};

    pub fn timeout() -> u64 {
        30
    }
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn request_delay() -> u64 {
        0
    }
    pub fn data_dir() -> PathBuf {
        PathBuf::from("data")
    }
    pub fn log_level() -> String {
        "info".into()
    }
    pub fn show_progress() -> bool {
        true
    }

    // Presents as an ordinary desktop browser. Compression is negotiated by the client.
    pub fn headers() -> BTreeMap<String, String> {
        [
            (
                "accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
            ),
            ("accept-language", "en-US,en;q=0.9"),
            ("cache-control", "no-cache"),
            ("pragma", "no-cache"),
            ("priority", "u=0, i"),
            (
                "sec-ch-ua",
                "\"Chromium\";v=\"134\", \"Not:A-Brand\";v=\"24\", \"Microsoft Edge\";v=\"134\"",
            ),
            ("sec-ch-ua-mobile", "?0"),
            ("sec-ch-ua-platform", "\"Windows\""),
            ("sec-fetch-dest", "document"),
            ("sec-fetch-mode", "navigate"),
            ("sec-fetch-site", "same-origin"),
            ("sec-fetch-user", "?1"),
            ("upgrade-insecure-requests", "1"),
            (
                "user-agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36 Edg/134.0.0.0",
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    pub fn sources() -> Vec<Source> {
        vec![
            Source::new(
                "NZ",
                &[
                    "https://www.health.govt.nz/regulation-legislation/certification-of-health-care-services/certified-providers/public-hospitals",
                    "https://www.health.govt.nz/regulation-legislation/certification-of-health-care-services/certified-providers/private-hospitals",
                ],
            ),
            Source::new(
                "AU",
                &["https://www.health.gov.au/resources/publications/list-of-declared-hospitals?language=en"],
            ),
        ]
    }

    pub fn naming_rules() -> Vec<NamingRule> {
        vec![
            NamingRule::new("NZ", "public-hospitals", "NZ_Public_Hospitals"),
            NamingRule::new("NZ", "private-hospitals", "NZ_Private_Hospitals"),
            NamingRule::new("AU", "declared-hospitals", "AU_Declared_Hospitals"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_user_agent() {
        let mut config = Config::default();
        config.fetcher.headers.remove("user-agent");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.fetcher.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_page_url() {
        let mut config = Config::default();
        config.sources[0].pages[0].url = "not a url".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml = r#"
            [fetcher]
            timeout_secs = 5

            [[sources]]
            name = "UK"
            pages = [{ url = "https://example.org/hospitals" }]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.fetcher.timeout_secs, 5);
        assert_eq!(config.fetcher.max_concurrent, 4);
        assert!(config.fetcher.user_agent().is_some());
        assert_eq!(config.sources.len(), 1);
        assert!(config.sources[0].pages[0].enabled);
        assert_eq!(config.naming_rules.len(), 3);
    }

    #[test]
    fn active_sources_filters_pages_and_names() {
        let mut config = Config::default();
        config.sources[1].pages[0].enabled = false;

        let active = config.active_sources(&[]);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "NZ");

        let only_nz = config.active_sources(&["nz".to_string()]);
        assert_eq!(only_nz.len(), 1);
        assert_eq!(only_nz[0].pages.len(), 2);
    }

    #[test]
    fn load_or_default_missing_file() {
        let config = Config::load_or_default("/nonexistent/config.toml").unwrap();
        assert_eq!(config.sources.len(), 2);
    }

    #[test]
    fn load_or_default_malformed_file_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[fetcher\n").unwrap();
        assert!(Config::load_or_default(&path).is_err());
    }

    #[test]
    fn bundled_config_is_valid() {
        let config: Config = toml::from_str(include_str!("../../data/config.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.naming_rules.len(), 3);
    }
}
