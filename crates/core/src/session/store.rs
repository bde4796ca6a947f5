//! Durable token persistence.
//!
//! The token pair is the only session state that survives a restart;
//! everything else is rebuilt by resuming against the API.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The access/refresh token pair issued at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived bearer credential for API requests.
    pub access: String,
    /// Longer-lived credential used solely to mint new access tokens.
    pub refresh: String,
}

/// Reads and writes the token pair at a fixed path.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Create a store backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted pair. A missing or unreadable file yields
    /// `None` so startup can degrade to an anonymous session.
    pub fn load(&self) -> Result<Option<TokenPair>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        match serde_json::from_str(&contents) {
            Ok(pair) => Ok(Some(pair)),
            Err(err) => {
                warn!("discarding unreadable token file {}: {err}", self.path.display());
                Ok(None)
            }
        }
    }

    /// Write the pair, creating parent directories if needed.
    pub fn persist(&self, tokens: &TokenPair) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let serialized = serde_json::to_vec_pretty(tokens).context("failed to serialize tokens")?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    /// Remove the backing file. A no-op when nothing is persisted.
    pub fn clear(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        fs::remove_file(&self.path)
            .with_context(|| format!("failed to remove {}", self.path.display()))
    }
}
