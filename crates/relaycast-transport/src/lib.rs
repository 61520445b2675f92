//! Gateway transport for relaycast sessions.
//!
//! Provides:
//! - Wire protocol (line-delimited, `type`-tagged JSON)
//! - `GatewayClient` - `SessionClient` over TCP, with on-disk credentials

pub mod gateway;
pub mod protocol;

pub use gateway::{GatewayClient, GatewayConfig, GatewaySession};
pub use protocol::{ClientFrame, ConnectionPhase, PresenceStatus, ServerFrame};
