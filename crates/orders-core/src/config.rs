use crate::error::{OrdersError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Redb,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Database file; relative paths resolve under `.orders/`.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    paths::DEFAULT_DB_FILE.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_db_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Re-read-and-retry attempts after a lost compare-and-swap before the
    /// conflict is returned to the caller.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
    #[serde(default = "default_max_actions")]
    pub max_actions: usize,
}

fn default_max_conflict_retries() -> u32 {
    3
}

fn default_max_actions() -> usize {
    50
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: default_max_conflict_retries(),
            max_actions: default_max_actions(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            store: StoreConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(OrdersError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn db_path(&self, root: &Path) -> PathBuf {
        paths::db_path(root, &self.store.path)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.store.backend == StoreBackend::Redb && self.store.path.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "store.path must not be empty for the redb backend".to_string(),
            });
        }

        if self.store.backend == StoreBackend::Memory {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "store.backend 'memory' keeps nothing between invocations".to_string(),
            });
        }

        if self.registry.max_conflict_retries == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "registry.max_conflict_retries is 0: every lost update is reported as a conflict"
                    .to_string(),
            });
        } else if self.registry.max_conflict_retries > 10 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "registry.max_conflict_retries is {}; values above 10 are unusual",
                    self.registry.max_conflict_retries
                ),
            });
        }

        if self.registry.max_actions == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "registry.max_actions is 0: no standing order could be created"
                    .to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
