//! Application configuration.

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// Directory under the user config dir holding client state.
pub const DEFAULT_DATA_DIR: &str = "eqdb";

/// File name of the on-disk configuration.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// File name of the persisted session tokens.
pub const TOKENS_FILE_NAME: &str = "tokens.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:5001/api/v1";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Runtime configuration assembled from defaults, the config file, and
/// `EQDB_*` environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the EQDB REST API, including the version prefix.
    pub api_base_url: String,
    /// Timeout applied to every outbound request.
    pub request_timeout_secs: u64,
    /// Directory holding the config file and persisted tokens.
    pub data_root: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            data_root: default_data_root(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(config_file_path())
    }

    /// Load configuration from an explicit config file path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let defaults = Self::default();
        let config = Config::builder()
            .set_default("api_base_url", defaults.api_base_url)?
            .set_default("request_timeout_secs", defaults.request_timeout_secs as i64)?
            .set_default("data_root", defaults.data_root.to_string_lossy().as_ref())?
            .add_source(File::from(path.clone()).required(false))
            .add_source(Environment::with_prefix("EQDB"))
            .build()
            .with_context(|| format!("failed to load config from {}", path.display()))?;

        config
            .try_deserialize()
            .context("failed to parse configuration")
    }

    /// Path to the persisted token file.
    pub fn tokens_path(&self) -> PathBuf {
        self.data_root.join(TOKENS_FILE_NAME)
    }
}

/// Default data directory under the user's config directory.
pub fn default_data_root() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DATA_DIR)
}

/// Path of the default configuration file.
pub fn config_file_path() -> PathBuf {
    default_data_root().join(CONFIG_FILE_NAME)
}

/// Write a default config file if none exists yet.
pub fn ensure_default_config() -> Result<()> {
    let path = config_file_path();
    if path.exists() {
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let defaults = AppConfig::default();
    let contents = format!(
        "api_base_url = \"{}\"\nrequest_timeout_secs = {}\n",
        defaults.api_base_url, defaults.request_timeout_secs
    );
    fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))
}
