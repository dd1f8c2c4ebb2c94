//! flare-relay: broadcast WebSocket relay for peer negotiation.
//!
//! Every connected client is a member of one shared bus. Whatever a member
//! sends is forwarded verbatim to every other member; the relay never
//! parses or stores payloads. The same port also answers `GET /health`,
//! CORS preflights, and a plain-text banner.

pub mod connection;
pub mod http;
pub mod origin;
pub mod registry;
pub mod server;

pub use http::{router, Health, RelayState};
pub use origin::OriginPolicy;
pub use registry::{ConnectionRegistry, Fanout, Frame};
pub use server::{BoundRelay, RelayServer};
