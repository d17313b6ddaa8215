use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use snapcat_core::{ArchiveExtensions, DigestAlgorithm};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings read from `config.toml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backup_root: Option<PathBuf>,
    pub catalog_algorithm: String,
    pub backup_algorithm: String,
    pub archive_extensions: Vec<String>,
    pub search_pattern: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backup_root: None,
            catalog_algorithm: DigestAlgorithm::CATALOG_DEFAULT.name().to_string(),
            backup_algorithm: DigestAlgorithm::BACKUP_DEFAULT.name().to_string(),
            archive_extensions: ArchiveExtensions::default().as_slice().to_vec(),
            search_pattern: "*".to_string(),
        }
    }
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "snapcat").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Loads `explicit` if given (it must exist), else the default config
    /// file if present, else built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.is_file() => path,
                _ => return Ok(Self::default()),
            },
        };

        debug!("Reading config from {}", path.display());
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn catalog_algorithm(&self) -> Result<DigestAlgorithm> {
        Ok(DigestAlgorithm::from_name(&self.catalog_algorithm)?)
    }

    pub fn backup_algorithm(&self) -> Result<DigestAlgorithm> {
        Ok(DigestAlgorithm::from_name(&self.backup_algorithm)?)
    }

    pub fn archive_extensions(&self) -> ArchiveExtensions {
        ArchiveExtensions::new(&self.archive_extensions)
    }

    /// `--root` wins over the config file, which wins over the current directory.
    pub fn backup_root(&self, cli_root: Option<&Path>) -> Result<PathBuf> {
        if let Some(root) = cli_root.or(self.backup_root.as_deref()) {
            return Ok(root.to_path_buf());
        }
        std::env::current_dir().map_err(|e| anyhow!("Cannot determine current directory: {}", e))
    }
}
