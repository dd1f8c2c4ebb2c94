use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for a negotiating endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// WebSocket URL of the relay.
    pub relay_url: String,
    /// STUN/TURN URLs handed to the transport.
    pub ice_servers: Vec<String>,
    /// Label of the data channel the offerer opens.
    pub channel_label: String,
    /// Send an offer as soon as the relay link comes up.
    pub auto_negotiate: bool,
    /// Upper bound for producing a local description.
    pub description_timeout_secs: u64,
    /// Upper bound for the answer / channel-open wait.
    pub answer_timeout_secs: u64,
    /// Upper bound for one relay connection attempt.
    pub connect_timeout_secs: u64,
    /// First reconnect delay; doubles on each failure.
    pub reconnect_delay_secs: u64,
    /// Cap for the reconnect delay.
    pub max_reconnect_delay_secs: u64,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:3000".into(),
            ice_servers: vec!["stun:stun.l.google.com:19302".into()],
            channel_label: "examSignal".into(),
            auto_negotiate: true,
            description_timeout_secs: 10,
            answer_timeout_secs: 30,
            connect_timeout_secs: 15,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
        }
    }
}

impl PeerConfig {
    pub fn description_timeout(&self) -> Duration {
        Duration::from_secs(self.description_timeout_secs)
    }

    pub fn answer_timeout(&self) -> Duration {
        Duration::from_secs(self.answer_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
