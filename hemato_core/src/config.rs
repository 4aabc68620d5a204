//! Configuration file support for Hemato.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/hemato/config.toml`.

use crate::aggregate::AggregationConfig;
use crate::filter::WarningPolicy;
use crate::metadata::DEFAULT_ID_COLUMN;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub metadata: MetadataConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Canonical table file name inside `data_dir`
    #[serde(default = "default_table_file")]
    pub table_file: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            table_file: default_table_file(),
        }
    }
}

impl DataConfig {
    pub fn table_path(&self) -> PathBuf {
        self.data_dir.join(&self.table_file)
    }
}

/// Filter engine configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct FilterConfig {
    #[serde(default)]
    pub warning_policy: WarningPolicy,
}

/// Metadata import configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            id_column: default_id_column(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        let home = std::env::var("HOME")
            .expect("HOME environment variable not set");
        PathBuf::from(home).join(".local/share")
    });
    base.join("hemato")
}

fn default_table_file() -> String {
    "table.csv".into()
}

fn default_id_column() -> String {
    DEFAULT_ID_COLUMN.into()
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.aggregation.separator.is_empty() {
            return Err(Error::Config("aggregation.separator must not be empty".into()));
        }
        if self.metadata.id_column.trim().is_empty() {
            return Err(Error::Config("metadata.id_column must not be empty".into()));
        }
        if self.data.table_file.trim().is_empty() {
            return Err(Error::Config("data.table_file must not be empty".into()));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            let home = std::env::var("HOME")
                .expect("HOME environment variable not set");
            PathBuf::from(home).join(".config")
        });
        base.join("hemato").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
