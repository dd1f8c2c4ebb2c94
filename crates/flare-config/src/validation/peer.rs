//! Peer section validation.

use super::helpers::{validate_non_empty, validate_range};
use crate::schema::FlareConfig;

pub(super) fn validate_peer(errors: &mut Vec<String>, config: &FlareConfig) {
    let p = &config.peer;

    if !(p.relay_url.starts_with("ws://") || p.relay_url.starts_with("wss://")) {
        errors.push(format!(
            "peer.relay_url = {:?} must start with ws:// or wss://",
            p.relay_url
        ));
    }

    validate_non_empty(errors, "peer.channel_label", &p.channel_label);
    validate_range(errors, "peer.description_timeout_secs", p.description_timeout_secs, 1, 300);
    validate_range(errors, "peer.answer_timeout_secs", p.answer_timeout_secs, 1, 600);
    validate_range(errors, "peer.connect_timeout_secs", p.connect_timeout_secs, 1, 300);
    validate_range(errors, "peer.reconnect_delay_secs", p.reconnect_delay_secs, 1, 3600);
    validate_range(errors, "peer.max_reconnect_delay_secs", p.max_reconnect_delay_secs, 1, 3600);

    if p.reconnect_delay_secs > p.max_reconnect_delay_secs {
        errors.push(format!(
            "peer.reconnect_delay_secs ({}) exceeds peer.max_reconnect_delay_secs ({})",
            p.reconnect_delay_secs, p.max_reconnect_delay_secs
        ));
    }
}
