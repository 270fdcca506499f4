use dirs::home_dir;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Account settings stored in ~/.oekoboiler.yml.
///
/// The password and tokens are never written; the password is passed on the
/// command line, through the environment or typed at the prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub email: String,
    pub app_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_serial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_host: Option<String>,
}

/// Get the path to the configuration file (~/.oekoboiler.yml)
pub fn get_config_path() -> Result<PathBuf> {
    let home = home_dir()
        .ok_or_else(|| Error::Config("Failed to determine home directory".to_string()))?;
    Ok(home.join(".oekoboiler.yml"))
}

pub fn load_config() -> Result<Option<Config>> {
    load_config_from(&get_config_path()?)
}

/// Loads the config at `path`. A missing file is not an error.
pub fn load_config_from(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        debug!("No configuration file at {}", path.display());
        return Ok(None);
    }

    let content = fs::read_to_string(path)?;
    let config = serde_yaml::from_str::<Config>(&content).map_err(|e| {
        Error::Config(format!(
            "Configuration file {} is invalid ({}). Please run 'oekoboiler login' again.",
            path.display(),
            e
        ))
    })?;

    debug!("Loaded configuration for user: {}", config.email);
    Ok(Some(config))
}

pub fn save_config(config: &Config) -> Result<()> {
    save_config_to(&get_config_path()?, config)
}

pub fn save_config_to(path: &Path, config: &Config) -> Result<()> {
    let content = serde_yaml::to_string(config)?;
    fs::write(path, content)?;

    debug!("Saved configuration for user: {}", config.email);
    Ok(())
}

pub fn clear_config() -> Result<()> {
    clear_config_at(&get_config_path()?)
}

/// Removes the config file (logout).
pub fn clear_config_at(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
        debug!("Configuration file cleared");
    } else {
        warn!("Configuration file does not exist, nothing to clear");
    }

    Ok(())
}
