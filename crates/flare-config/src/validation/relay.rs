//! Relay section validation.

use super::helpers::{validate_non_empty, validate_range};
use crate::schema::FlareConfig;

pub(super) fn validate_relay(errors: &mut Vec<String>, config: &FlareConfig) {
    let r = &config.relay;

    validate_non_empty(errors, "relay.bind_address", &r.bind_address);
    validate_range(errors, "relay.port", u64::from(r.port), 1, 65535);
    validate_range(errors, "relay.member_buffer", r.member_buffer as u64, 1, 65536);

    if r.allowed_origins.is_empty() {
        errors.push("relay.allowed_origins must list at least one origin or \"*\"".into());
    }
    for origin in &r.allowed_origins {
        if origin.trim().is_empty() {
            errors.push("relay.allowed_origins contains an empty entry".into());
        }
    }
}
