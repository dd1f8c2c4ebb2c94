//! Default TOML config template with inline documentation comments.

use crate::schema::CONFIG_SCHEMA_VERSION;

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    format!("# flare configuration\n# Schema version {CONFIG_SCHEMA_VERSION}\n{BODY}")
}

const BODY: &str = r##"# Only override what you want to change -- missing fields use defaults.
# PORT, ALLOWED_ORIGINS and FLARE_RELAY_URL in the environment win over this file.

[relay]
# bind_address = "0.0.0.0"
# port = 3000
# allowed_origins = ["*"]           # e.g. ["https://exam.example.com"]
# member_buffer = 256               # 1-65536 frames queued per connection
# banner = "WebSocket Signaling Server Running\n"

[peer]
# relay_url = "ws://127.0.0.1:3000"
# ice_servers = ["stun:stun.l.google.com:19302"]
# channel_label = "examSignal"
# auto_negotiate = true             # offer as soon as the relay link is up
# description_timeout_secs = 10     # 1-300
# answer_timeout_secs = 30          # 1-600
# connect_timeout_secs = 15         # 1-300
# reconnect_delay_secs = 1
# max_reconnect_delay_secs = 30
"##;
