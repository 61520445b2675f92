//! Connection supervision and resumable dispatch.
//!
//! Provides:
//! - `Supervisor` - Own the session, classify disconnects, reconnect
//! - `Dispatcher` - Send every message to every target, resumably
//! - `NetworkMonitor` - Wait for network reachability
//! - Heartbeat, reconnect backoff and first-run setup
//! - Progress store implementations (memory, file)

pub mod backoff;
pub mod dispatch;
pub mod heartbeat;
pub mod network;
pub mod setup;
pub mod storage;
pub mod supervisor;

pub use backoff::{Backoff, BackoffPolicy};
pub use dispatch::Dispatcher;
pub use network::{DnsProbe, NetworkMonitor, Probe};
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorError};
