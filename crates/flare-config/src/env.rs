//! Environment layer: `.env` loading and variable overrides.
//!
//! | Variable          | Overrides                 |
//! |-------------------|---------------------------|
//! | `PORT`            | `relay.port`              |
//! | `ALLOWED_ORIGINS` | `relay.allowed_origins`   |
//! | `FLARE_RELAY_URL` | `peer.relay_url`          |

use crate::schema::FlareConfig;
use std::path::Path;
use tracing::{debug, warn};

pub const PORT_VAR: &str = "PORT";
pub const ALLOWED_ORIGINS_VAR: &str = "ALLOWED_ORIGINS";
pub const RELAY_URL_VAR: &str = "FLARE_RELAY_URL";

/// Load `KEY=value` pairs from a dotenv file into the process environment.
///
/// Variables already set are left alone. Returns the number of variables set.
pub fn load_dotenv(path: &Path) -> usize {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return 0;
    };

    let mut applied = 0;
    for (key, value) in parse_dotenv(&contents) {
        if std::env::var(&key).is_err() {
            std::env::set_var(&key, value);
            applied += 1;
        }
    }
    debug!("loaded {applied} variables from {}", path.display());
    applied
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let value = value.trim().trim_matches('"').trim_matches('\'');
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

/// Apply environment overrides using `lookup` to read variables.
///
/// Values that fail to parse are ignored with a warning.
pub fn apply_overrides<F>(config: &mut FlareConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(PORT_VAR) {
        match raw.trim().parse::<u16>() {
            Ok(port) if port > 0 => config.relay.port = port,
            _ => warn!("ignoring {PORT_VAR}={raw:?}: not a valid port"),
        }
    }

    if let Some(raw) = lookup(ALLOWED_ORIGINS_VAR) {
        let origins = parse_origin_list(&raw);
        if origins.is_empty() {
            warn!("ignoring empty {ALLOWED_ORIGINS_VAR}");
        } else {
            config.relay.allowed_origins = origins;
        }
    }

    if let Some(raw) = lookup(RELAY_URL_VAR) {
        let url = raw.trim();
        if url.starts_with("ws://") || url.starts_with("wss://") {
            config.peer.relay_url = url.to_string();
        } else {
            warn!("ignoring {RELAY_URL_VAR}={raw:?}: expected ws:// or wss://");
        }
    }
}

/// Split a comma-separated origin list, dropping blanks.
pub fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
