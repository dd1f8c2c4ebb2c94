//! Configuration schema types for flare.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod peer;
mod relay;

pub use peer::*;
pub use relay::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration shared by the relay and peer binaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlareConfig {
    pub relay: RelayConfig,
    pub peer: PeerConfig,
}
