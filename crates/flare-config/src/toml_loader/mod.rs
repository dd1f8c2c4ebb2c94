//! Reading the TOML config file, and writing the commented default.

mod template;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use flare_common::ConfigError;
use tracing::{debug, info, warn};

use crate::schema::FlareConfig;
use crate::validation;

pub(crate) use template::default_config_toml;

/// `<config dir>/flare/config.toml`, e.g. `~/.config/flare/config.toml` on Linux.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("flare").join("config.toml"))
        .ok_or_else(|| ConfigError::ParseError("no platform config directory".into()))
}

/// Parse one config file. Fields the file leaves out keep their defaults.
///
/// Rule violations are only logged; [`crate::load_config`] is where they
/// become fatal.
pub fn load_from_path(path: &Path) -> Result<FlareConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound(path.to_path_buf())
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let config: FlareConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;

    if let Err(e) = validation::validate(&config) {
        warn!(path = %path.display(), error = %e, "Config has invalid values");
    }

    info!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Load the file at [`default_config_path`], writing the commented default
/// there first when it is missing.
pub fn load_default() -> Result<FlareConfig, ConfigError> {
    let path = default_config_path()?;
    match load_from_path(&path) {
        Err(ConfigError::FileNotFound(_)) => {
            debug!(path = %path.display(), "No config file yet");
            if let Err(e) = create_default_config(&path) {
                warn!(error = %e, "Could not write default config; using built-in defaults");
            }
            Ok(FlareConfig::default())
        }
        other => other,
    }
}

/// Write the commented default config, creating parent directories.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, default_config_toml()).map_err(io_err)?;

    info!(path = %path.display(), "Wrote default config");
    Ok(())
}
