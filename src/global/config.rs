use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::{Result, UpdateError};
use crate::global::utils::get_global_config_file;

pub const DEFAULT_PACKAGE_LIST: &str = "updates.xml";
pub const DEFAULT_MANIFEST: &str = "update.xml";
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// User settings read from `config.toml`.
///
/// Every field is optional in the file; missing ones take their defaults.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Package list used when no `--list` is given.
    pub package_list: PathBuf,
    /// Installed manifest used when no `--manifest` is given.
    pub manifest: PathBuf,
    /// Keep local archives after installing them.
    pub keep_archives: bool,
    /// Default log filter, overridden by `RUST_LOG`.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            package_list: PathBuf::from(DEFAULT_PACKAGE_LIST),
            manifest: PathBuf::from(DEFAULT_MANIFEST),
            keep_archives: false,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Loads the config from `path`, or from the global config file when `path` is `None`.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    /// Returns [`UpdateError::Config`] if the file exists but can't be read or parsed.
    pub fn load_from_optional_path(path: Option<&Path>) -> Result<Config> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match get_global_config_file() {
                Ok(path) => path,
                Err(_) => return Ok(Config::default()),
            },
        };
        if !path.exists() {
            return Ok(Config::default());
        }
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            UpdateError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            UpdateError::Config(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| UpdateError::Config(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| UpdateError::io(path, e))
    }
}
