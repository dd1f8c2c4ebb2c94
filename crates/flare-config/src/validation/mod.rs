//! Full configuration validation.
//!
//! Each section has its own submodule; this orchestrator calls them all
//! and collects errors into a single `ConfigError`.

mod helpers;
mod peer;
mod relay;


use crate::schema::FlareConfig;
use flare_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &FlareConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    relay::validate_relay(&mut errors, config);
    peer::validate_peer(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
