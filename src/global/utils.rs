use std::path::PathBuf;
use directories::ProjectDirs;
use crate::error::{Result, UpdateError};

pub const CONFIG_FILE_NAME: &str = "config.toml";

pub fn get_global_config_dir() -> Result<PathBuf> {
    Ok(get_project_dirs()?.config_dir().to_path_buf())
}

/// Default location of the user config file, e.g. `~/.config/updatekit/config.toml`.
pub fn get_global_config_file() -> Result<PathBuf> {
    Ok(get_global_config_dir()?.join(CONFIG_FILE_NAME))
}

fn get_project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("org", "updatekit", "updatekit")
        .ok_or_else(|| UpdateError::Config("Could not determine project directories".to_string()))
}
