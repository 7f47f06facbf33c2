// src/config.rs

//! Configuration loading utilities.
//!
//! Loads the TOML config, validates it, and opens the storage it points at.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::storage::LocalStorage;

/// Load and validate configuration from a TOML file.
///
/// A missing file yields defaults. A malformed or invalid file is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load_or_default(path)?;
    config
        .validate()
        .map_err(|e| AppError::config(format!("Invalid config {}: {e}", path.display())))?;
    Ok(config)
}

/// Load configuration and open local storage under its data directory.
///
/// A relative data directory is resolved against the working directory.
pub fn load_all(config_path: &Path) -> Result<(Config, LocalStorage)> {
    let config = load_config(config_path)?;
    let data_dir = config.paths.data_dir_in(&std::env::current_dir()?);
    log::debug!("Using data directory {}", data_dir.display());
    Ok((config, LocalStorage::new(data_dir)))
}
