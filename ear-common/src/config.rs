//! Configuration file lookup and root folder resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "EAR_ROOT_FOLDER";

/// Application directory name used under the platform config/data dirs
const APP_DIR: &str = "ear";

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. `root_folder` key of the TOML config file
/// 4. OS-dependent compiled default
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config_file: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        info!("Root folder from command line: {}", path.display());
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            info!("Root folder from {}: {}", env_var_name, path);
            return PathBuf::from(path);
        }
    }

    if let Some(config_path) = config_file {
        if let Some(root_folder) = root_folder_from_toml(config_path) {
            info!("Root folder from {}: {}", config_path.display(), root_folder.display());
            return root_folder;
        }
    }

    let fallback = default_root_folder();
    info!("Root folder (compiled default): {}", fallback.display());
    fallback
}

/// `root_folder` key of a TOML file; unreadable or invalid files are
/// skipped with a warning
fn root_folder_from_toml(config_path: &Path) -> Option<PathBuf> {
    let content = match std::fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Cannot read {} for root_folder: {}", config_path.display(), e);
            return None;
        }
    };
    let config = match toml::from_str::<toml::Value>(&content) {
        Ok(config) => config,
        Err(e) => {
            warn!("Invalid TOML in {}, ignoring its root_folder: {}", config_path.display(), e);
            return None;
        }
    };
    config
        .get("root_folder")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
}

/// Locate the default configuration file for the platform.
///
/// Linux checks `~/.config/ear/config.toml` then `/etc/ear/config.toml`.
pub fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
        debug!("No user config at {}", path.display());
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/ear/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("/var/lib/ear"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/ear"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\ear"))
    } else {
        PathBuf::from("./ear_data")
    }
}

/// Load and deserialize a TOML file.
///
/// A missing file is reported as `Error::Config` so callers can decide
/// whether to fall back to defaults.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
    })?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))
}
