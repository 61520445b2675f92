//! Core abstractions for resilient message delivery sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `Target` / `MessageQueue` - What gets sent, and to whom
//! - `RunConfig` / `SessionContext` - Run state that survives reconnects
//! - `ConnectionEvent` / `DisconnectReason` - Session lifecycle signals
//! - Session, client, storage and operator traits

pub mod context;
pub mod event;
pub mod queue;
pub mod target;
pub mod traits;

pub use context::{RunConfig, SessionContext};
pub use event::{ConnectionEvent, ConnectionState, Credentials, DisconnectReason, FailureClass};
pub use queue::MessageQueue;
pub use target::{GroupInfo, Target, TargetKind};
pub use traits::{Operator, ProgressStore, Session, SessionClient};
