//! Static service configuration, read once at startup.

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::ai::Provider;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Root of the organized file store.
    pub root_dir: PathBuf,
    /// Name of the watched inbox folder directly under the root.
    pub source_folder: String,
    /// Files processed per pipeline invocation.
    pub batch_size: usize,
    /// Indexer time budget per continuation, in seconds.
    pub scan_budget_secs: u64,
    /// Folder cache refresh interval in hours (multi-day values work).
    pub cache_refresh_hours: u64,
    /// Maximum classifiable file size in megabytes.
    pub max_size_mb: u64,
    /// Which classification backend to call.
    pub provider: Provider,
    pub anthropic_model: String,
    pub openai_model: String,
    /// Blacklist rules: bare folder names or root-relative paths.
    pub blacklist: Vec<String>,
    /// Minimum spacing between classification calls, in milliseconds.
    pub min_call_spacing_ms: u64,
    /// Delay between files within a batch, in milliseconds.
    pub inter_file_delay_ms: u64,
    /// How often the pipeline entry point runs, in seconds.
    pub pipeline_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("Documents"),
            source_folder: "Inbox".to_string(),
            batch_size: 5,
            scan_budget_secs: 240,
            cache_refresh_hours: 72,
            max_size_mb: 18,
            provider: Provider::Anthropic,
            anthropic_model: "claude-3-5-haiku-latest".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            blacklist: Vec::new(),
            min_call_spacing_ms: 500,
            inter_file_delay_ms: 1000,
            pipeline_interval_secs: 60,
        }
    }
}

impl Settings {
    /// Default config file location: `~/.config/custodian/config.json`,
    /// overridable with `CUSTODIAN_CONFIG`.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("CUSTODIAN_CONFIG") {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("custodian")
            .join("config.json")
    }

    /// Load settings from the config file; an absent file yields
    /// defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Model identifier for the selected provider.
    pub fn model(&self) -> &str {
        match self.provider {
            Provider::Anthropic => &self.anthropic_model,
            Provider::Openai => &self.openai_model,
        }
    }
}
