//! Data directory layout and the optional `config.toml` inside it.

use crate::error::{Error, Result};
use crate::hash::{Algorithm, Hasher};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the config file inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";
/// Default Sources document name.
pub const SOURCES_FILE: &str = "Sources.json";
/// Default Backups document name.
pub const BACKUPS_FILE: &str = "Backups.json";
/// Default content store directory name.
pub const BACKUPS_DIR: &str = "Backups";

/// Effective configuration for one data directory.
///
/// Every field is optional in the file. Relative paths are resolved against
/// the data directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Set when loaded from an explicit path instead of the data directory.
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backups_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backups_file: Option<PathBuf>,
    pub algorithm: Algorithm,
    /// Worker pool size; defaults to the available parallelism.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

impl Config {
    /// Defaults for `data_dir`, without reading anything.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Read `config.toml` from `data_dir` if it exists.
    pub fn load(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        let path = data_dir.join(CONFIG_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new(data_dir)),
            Err(e) => return Err(Error::io_at(&path, e)),
        };
        Self::parse(data_dir, path, &content)
    }

    /// Read an explicitly named config file, which must exist.
    ///
    /// Relative paths inside it still resolve against `data_dir`.
    pub fn load_file(data_dir: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path).map_err(|e| Error::io_at(&path, e))?;
        let mut config = Self::parse(data_dir.into(), path.clone(), &content)?;
        config.config_file = Some(path);
        Ok(config)
    }

    fn parse(data_dir: PathBuf, path: PathBuf, content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(content).map_err(|e| Error::config(&path, e.to_string()))?;
        if config.workers == Some(0) {
            return Err(Error::config(&path, "workers must be at least 1"));
        }
        config.data_dir = data_dir;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// The file this configuration was read from, or would be.
    pub fn config_file(&self) -> PathBuf {
        match &self.config_file {
            Some(path) => path.clone(),
            None => self.data_dir.join(CONFIG_FILE),
        }
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.resolve(self.backups_dir.as_deref(), BACKUPS_DIR)
    }

    pub fn sources_file(&self) -> PathBuf {
        self.resolve(self.sources_file.as_deref(), SOURCES_FILE)
    }

    pub fn backups_file(&self) -> PathBuf {
        self.resolve(self.backups_file.as_deref(), BACKUPS_FILE)
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn hasher(&self) -> Hasher {
        Hasher::new(self.algorithm)
    }

    /// Render the file-backed fields as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(self.config_file(), e.to_string()))
    }

    fn resolve(&self, configured: Option<&Path>, default: &str) -> PathBuf {
        match configured {
            Some(path) => self.data_dir.join(path),
            None => self.data_dir.join(default),
        }
    }
}
