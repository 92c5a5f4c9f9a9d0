//! Configuration for the search index and project memory data directories.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::IndexError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_index_dir")]
    pub index_data_dir: PathBuf,

    #[serde(default = "default_memory_dir")]
    pub memory_data_dir: PathBuf,
}

fn default_index_dir() -> PathBuf {
    dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("fleetd").join("index")
}

fn default_memory_dir() -> PathBuf {
    dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("fleetd").join("memory")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_data_dir: default_index_dir(),
            memory_data_dir: default_memory_dir(),
        }
    }
}

impl Config {
    /// Load from an explicit YAML file, falling back to defaults if absent.
    pub fn load(path: Option<&PathBuf>) -> Result<Self, IndexError> {
        if let Some(path) = path {
            let content = std::fs::read_to_string(path)?;
            return Ok(serde_yaml::from_str(&content)?);
        }
        Ok(Config::default())
    }
}
