use serde::{Deserialize, Serialize};

/// Settings for the relay process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Interface to bind.
    pub bind_address: String,
    /// Port for both WebSocket upgrades and the HTTP surface.
    pub port: u16,
    /// Origins allowed to open a relay connection. `"*"` allows any.
    pub allowed_origins: Vec<String>,
    /// Frames queued per member before fan-out starts dropping for it.
    pub member_buffer: usize,
    /// Plain-text body for paths other than `/health`.
    pub banner: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: 3000,
            allowed_origins: vec!["*".into()],
            member_buffer: 256,
            banner: "WebSocket Signaling Server Running\n".into(),
        }
    }
}

impl RelayConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}
