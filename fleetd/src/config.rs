//! Configuration loading (§6 recognized options, §10.2 fallback chain).

use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Root configuration, loadable from YAML. Every field has a default so a
/// partial config file still produces a complete `Config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub worker_count: WorkerCountConfig,
    pub providers: Vec<ProviderConfig>,
    pub routing: RoutingConfig,
    pub cache: CacheConfig,
    pub index: DataDirConfig,
    pub memory: DataDirConfig,
    pub ledger: LedgerConfig,
    pub http: HttpConfig,
    #[serde(rename = "log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_count: WorkerCountConfig::default(),
            providers: Vec::new(),
            routing: RoutingConfig::default(),
            cache: CacheConfig::default(),
            index: DataDirConfig::default(),
            memory: DataDirConfig { data_dir: default_data_dir().join("memory") },
            ledger: LedgerConfig::default(),
            http: HttpConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load with the fallback chain: explicit path, then `.fleetd.yml` in
    /// the current directory, then `$XDG_CONFIG_HOME/fleetd/fleetd.yml`,
    /// then compiled-in defaults (§10.2).
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".fleetd.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(err) => tracing::warn!("failed to load config from {}: {err}", local_config.display()),
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("fleetd").join("fleetd.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(err) => tracing::warn!("failed to load config from {}: {err}", user_config.display()),
                }
            }
        }

        tracing::info!("no config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).context("failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("failed to parse config file")?;
        tracing::info!("loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerCountConfig {
    pub total: u32,
}

impl Default for WorkerCountConfig {
    fn default() -> Self {
        Self { total: 128 }
    }
}

/// One configured upstream endpoint. `credential_env` names the environment
/// variable holding the actual secret — never written to the config file or
/// logs (§10.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    #[serde(rename = "credential_env")]
    pub credential_env: String,
    pub concurrency_cap: u32,
    pub token_budget_per_minute: Option<u64>,
    pub models: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            credential_env: "OPENAI_API_KEY".to_string(),
            concurrency_cap: 16,
            token_budget_per_minute: None,
            models: vec!["gpt-4o-mini".to_string()],
        }
    }
}

impl ProviderConfig {
    /// Resolve the actual credential from the named environment variable.
    /// Fails with a descriptive error rather than silently using an empty
    /// string, since an empty bearer token would surface as a confusing 401.
    pub fn resolve_credential(&self) -> Result<String> {
        std::env::var(&self.credential_env)
            .with_context(|| format!("credential env var {} is not set for provider {}", self.credential_env, self.name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub fast_model: String,
    pub standard_model: String,
    pub deep_model: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self { fast_model: "gpt-4o-mini".to_string(), standard_model: "gpt-4o".to_string(), deep_model: "gpt-4o".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: false, ttl_seconds: 300 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataDirConfig {
    pub data_dir: PathBuf,
}

impl Default for DataDirConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir().join("index") }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub data_dir: PathBuf,
    pub genesis_id: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir().join("ledger"), genesis_id: "genesis".to_string() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// If set, enables the HTTP API at this address (§6).
    pub listen_addr: Option<String>,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("fleetd")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_worker_count() {
        assert_eq!(Config::default().worker_count.total, 128);
    }

    #[test]
    fn loads_from_explicit_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yml");
        std::fs::write(&path, "log_level: debug\nworker_count:\n  total: 64\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.worker_count.total, 64);
    }

    #[test]
    fn missing_credential_env_errors_with_provider_name() {
        let provider = ProviderConfig { credential_env: "FLEETD_TEST_MISSING_VAR_XYZ".to_string(), ..ProviderConfig::default() };
        let err = provider.resolve_credential().unwrap_err();
        assert!(err.to_string().contains("default"));
    }
}
