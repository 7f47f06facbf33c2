// src/error.rs

//! Unified error handling for the fetcher application.

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// Result type alias for fetcher operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport failed (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Request to {url} failed with status {status}")]
    Status { url: String, status: u16 },

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSV reading or writing failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Spreadsheet decoding failed
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Downloaded content could not be turned into a table
    #[error("Parse error for {context}: {message}")]
    Parse { context: String, message: String },

    /// Cell normalization failed while comparing datasets
    #[error("Comparison error: {0}")]
    Comparison(String),

    /// Writing a persisted file failed
    #[error("Persistence error at {path}: {message}")]
    Persistence { path: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a parse error with context.
    pub fn parse(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a comparison error.
    pub fn comparison(message: impl Into<String>) -> Self {
        Self::Comparison(message.into())
    }

    /// Create a persistence error for a path.
    pub fn persistence(path: &Path, message: impl fmt::Display) -> Self {
        Self::Persistence {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether this error came from the network layer.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_message() {
        let err = AppError::Status {
            url: "https://example.com/a".into(),
            status: 500,
        };
        assert_eq!(
            err.to_string(),
            "Request to https://example.com/a failed with status 500"
        );
        assert!(err.is_network());
    }

    #[test]
    fn test_parse_error_is_not_network() {
        let err = AppError::parse("file.csv", "bad row");
        assert!(!err.is_network());
        assert!(err.to_string().contains("file.csv"));
    }
}
