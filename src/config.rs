use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub storage: StorageConfig,
    pub log: LogConfig,
    pub retrieval: RetrievalConfig,
    pub indexer: IndexerConfig,
    pub backup: BackupConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory; the store lives under `<memory_path>/.memory/`.
    pub memory_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Context expansion depth for scoped searches, 1–3.
    pub context_depth: u8,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexerConfig {
    pub poll_interval_ms: u64,
    pub auto_create_relations: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BackupConfig {
    pub keep_last: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            log: LogConfig::default(),
            retrieval: RetrievalConfig::default(),
            indexer: IndexerConfig::default(),
            backup: BackupConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            memory_path: ".".into(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { context_depth: 2 }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            auto_create_relations: true,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self { keep_last: 5 }
    }
}

/// Returns the default config file path: `~/.engram/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".engram")
        .join("config.toml")
}

impl MemoryConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MemoryConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (MEMORY_PATH, LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MEMORY_PATH") {
            self.storage.memory_path = val;
        }
        if let Ok(val) = std::env::var("LOG_LEVEL") {
            self.log.level = val;
        }
    }

    /// The base directory, with `~` expanded.
    pub fn base_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.memory_path)
    }

    /// `<memory_path>/.memory/`
    pub fn memory_dir(&self) -> PathBuf {
        self.base_dir().join(".memory")
    }

    /// `<memory_path>/.memory/memory.db`
    pub fn db_path(&self) -> PathBuf {
        self.memory_dir().join("memory.db")
    }

    /// `<memory_path>/.memory/backups/`
    pub fn backups_dir(&self) -> PathBuf {
        self.memory_dir().join("backups")
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}
