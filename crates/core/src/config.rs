//! Configuration structures for the candle archive tools.

use crate::error::{Error, Result};
use crate::types::Resolution;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding the config file path.
pub const CONFIG_PATH_ENV: &str = "CANDLESTORE_CONFIG";

/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Archive file locations.
    pub datasets: DatasetsConfig,
    /// Remote candle source.
    pub remote: RemoteConfig,
    /// Synchronization behaviour.
    pub sync: SyncConfig,
    /// Outlier correction parameters.
    pub cleaning: CleaningConfig,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::config(format!(
                "could not find configuration file \"{}\"",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Load configuration from the path in `CANDLESTORE_CONFIG`, or `config.json`.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_file(path)
    }
}

/// Archive file locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetsConfig {
    /// Archive holding raw candles from the remote source.
    pub candles_dataset_path: Option<PathBuf>,
    /// Archive holding outlier-corrected candles.
    pub clean_candles_dataset_path: Option<PathBuf>,
}

impl DatasetsConfig {
    /// Path of the raw archive.
    pub fn raw_path(&self) -> Result<&Path> {
        self.candles_dataset_path
            .as_deref()
            .ok_or_else(|| Error::config("datasets.candles_dataset_path is not set"))
    }

    /// Path of the cleaned archive.
    pub fn clean_path(&self) -> Result<&Path> {
        self.clean_candles_dataset_path
            .as_deref()
            .ok_or_else(|| Error::config("datasets.clean_candles_dataset_path is not set"))
    }
}

/// Remote source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// API base URL.
    pub base_url: String,
    /// Trading symbol (e.g., "tBTCUSD").
    pub symbol: String,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-pub.bitfinex.com/v2".to_string(),
            symbol: "tBTCUSD".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Synchronization configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum candles requested per history page.
    pub page_limit: usize,
    /// Local/remote latest timestamps closer than this are considered equal (ms).
    pub tolerance_ms: i64,
    /// Fixed pause between pages, for progress output only (ms).
    pub progress_delay_ms: u64,
    /// Resolutions to synchronize, in order.
    pub resolutions: Vec<Resolution>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_limit: 1000,
            tolerance_ms: 2 * 60 * 1000,
            progress_delay_ms: 50,
            resolutions: Resolution::ALL.to_vec(),
        }
    }
}

/// Outlier correction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Past and future differences considered on each side of a candle.
    pub stat_length: usize,
    /// Standard deviations beyond the weighted mean that flag a wick.
    pub sigma_limit: f64,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            stat_length: 10,
            sigma_limit: 0.5,
        }
    }
}
