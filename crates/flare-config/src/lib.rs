//! Flare configuration system.
//!
//! TOML-based configuration shared by the relay and the negotiating peer.
//! All sections use defaults so partial configs work out of the box, and a
//! handful of environment variables override the file for container
//! deployments.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use flare_config::{config_to_json, load_config};
//!
//! let config = load_config(None).expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod env;
pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{FlareConfig, PeerConfig, RelayConfig, CONFIG_SCHEMA_VERSION};

use flare_common::ConfigError;
use std::path::Path;

/// Load config from `path`, or from the platform default when `None`.
///
/// Reads a `.env` file first (without overwriting variables already set),
/// then layers environment overrides on top of the file, then validates.
pub fn load_config(path: Option<&Path>) -> Result<FlareConfig, ConfigError> {
    env::load_dotenv(Path::new(".env"));

    let mut config = match path {
        Some(path) => toml_loader::load_from_path(path)?,
        None => toml_loader::load_default()?,
    };

    env::apply_overrides(&mut config, |key| std::env::var(key).ok());

    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &FlareConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
