//! taskdispatch configuration loading
//!
//! Resolves a [`DispatcherConfig`] from files and environment variables.
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments (applied by the binary)
//! 2. Environment variables (TASKDISPATCH_*)
//! 3. Explicit file (--config) or project-level (./taskdispatch.toml)
//! 4. User-level (~/.config/taskdispatch/config.toml)
//! 5. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use taskdispatch::util::config::resolve_config;
//!
//! let config = resolve_config(None).unwrap();
//! assert!(config.num_workers >= 1);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::runtime::dispatch::DispatcherConfig;

/// Project-level config file name.
pub const PROJECT_CONFIG_FILE: &str = "taskdispatch.toml";

/// Worker count override.
pub const ENV_WORKERS: &str = "TASKDISPATCH_WORKERS";

/// Pool slot count override.
pub const ENV_POOL_SLOTS: &str = "TASKDISPATCH_POOL_SLOTS";

/// Submit timeout override, in milliseconds.
pub const ENV_SUBMIT_TIMEOUT_MS: &str = "TASKDISPATCH_SUBMIT_TIMEOUT_MS";

/// Get the user config directory
pub fn get_config_dir() -> Option<PathBuf> {
    // Try XDG config directory on Unix
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("taskdispatch"));
    }

    // Fallback to ~/.config/taskdispatch
    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config").join("taskdispatch"));
    }

    // On Windows, try %APPDATA%
    if let Ok(appdata) = std::env::var("APPDATA") {
        return Some(PathBuf::from(appdata).join("taskdispatch"));
    }

    None
}

/// Get the user config file path (~/.config/taskdispatch/config.toml)
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Parse a config from TOML text. Missing fields take their defaults.
pub fn parse_config(content: &str) -> Result<DispatcherConfig, ConfigError> {
    toml::from_str(content).map_err(ConfigError::ParseError)
}

/// Load a config file.
pub fn load_config_file(path: &Path) -> Result<DispatcherConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::IoError)?;
    parse_config(&content)
}

/// Save a config file, creating parent directories as needed.
pub fn save_config_file(
    path: &Path,
    config: &DispatcherConfig,
) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir).map_err(ConfigError::IoError)?;
        }
    }

    fs::write(path, to_toml_string(config)?).map_err(ConfigError::IoError)
}

/// Render a config as pretty TOML.
pub fn to_toml_string(config: &DispatcherConfig) -> Result<String, ConfigError> {
    toml::to_string_pretty(config).map_err(ConfigError::SerializeError)
}

/// Load the file-level config.
///
/// An explicit path must exist. Otherwise the project file, then the user
/// file, is used if present; defaults apply when neither exists.
pub fn load_config(explicit: Option<&Path>) -> Result<DispatcherConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_config_file(path);
    }

    let project = PathBuf::from(PROJECT_CONFIG_FILE);
    if project.exists() {
        return load_config_file(&project);
    }

    match get_config_path() {
        Some(path) if path.exists() => load_config_file(&path),
        _ => Ok(DispatcherConfig::default()),
    }
}

/// Apply overrides from `lookup` (normally the process environment).
pub fn apply_overrides<F>(
    config: &mut DispatcherConfig,
    lookup: F,
) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(ENV_WORKERS) {
        config.num_workers = parse_env(ENV_WORKERS, &value)?;
    }
    if let Some(value) = lookup(ENV_POOL_SLOTS) {
        config.pool_slots = parse_env(ENV_POOL_SLOTS, &value)?;
        config.pool_bytes = None;
    }
    if let Some(value) = lookup(ENV_SUBMIT_TIMEOUT_MS) {
        config.submit_timeout_ms = Some(parse_env(ENV_SUBMIT_TIMEOUT_MS, &value)?);
    }
    Ok(())
}

/// Apply `TASKDISPATCH_*` environment overrides.
pub fn apply_env_overrides(config: &mut DispatcherConfig) -> Result<(), ConfigError> {
    apply_overrides(config, |var| std::env::var(var).ok())
}

/// Load, apply environment overrides and validate.
pub fn resolve_config(explicit: Option<&Path>) -> Result<DispatcherConfig, ConfigError> {
    let mut config = load_config(explicit)?;
    apply_env_overrides(&mut config)?;
    config
        .validate()
        .map_err(|err| ConfigError::Invalid(err.to_string()))?;
    Ok(config)
}

fn parse_env<T: std::str::FromStr>(
    var: &'static str,
    value: &str,
) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
    })
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    ParseError(toml::de::Error),
    SerializeError(toml::ser::Error),
    InvalidEnv { var: &'static str, value: String },
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Config parse error: {}", e),
            ConfigError::SerializeError(e) => write!(f, "Config serialize error: {}", e),
            ConfigError::InvalidEnv { var, value } => {
                write!(f, "Invalid value '{}' for {}", value, var)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests;
