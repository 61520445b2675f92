//! Connection lifecycle events and disconnect classification.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque credential material produced by the session client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(pub Value);

/// Event emitted by a live session.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The session is open and ready to send.
    Open,
    /// The session closed.
    Closed(DisconnectReason),
    /// Credential material changed and should be persisted.
    CredentialsUpdated(Credentials),
}

/// Structured disconnect cause, keyed by the service's status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The account was logged out or the device unlinked (401).
    LoggedOut,
    /// The remote closed the connection (428).
    ConnectionClosed,
    /// The connection dropped or timed out (408).
    ConnectionLost,
    /// Another client took over the session (440).
    ConnectionReplaced,
    /// The session state was rejected (500).
    BadSession,
    /// The remote asked for a restart, typically right after pairing (515).
    RestartRequired,
    /// Any other status, or none at all.
    Other(Option<u16>),
}

/// How the supervisor reacts to a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Requires re-authentication; never retried.
    Terminal,
    /// Eligible for automatic reconnect.
    Recoverable,
}

impl DisconnectReason {
    /// Map a close status code to a reason.
    #[must_use]
    pub const fn from_status(status: Option<u16>) -> Self {
        match status {
            Some(401) => Self::LoggedOut,
            Some(428) => Self::ConnectionClosed,
            Some(408) => Self::ConnectionLost,
            Some(440) => Self::ConnectionReplaced,
            Some(500) => Self::BadSession,
            Some(515) => Self::RestartRequired,
            other => Self::Other(other),
        }
    }

    /// Status code carried by this reason, if any.
    #[must_use]
    pub const fn status(self) -> Option<u16> {
        match self {
            Self::LoggedOut => Some(401),
            Self::ConnectionClosed => Some(428),
            Self::ConnectionLost => Some(408),
            Self::ConnectionReplaced => Some(440),
            Self::BadSession => Some(500),
            Self::RestartRequired => Some(515),
            Self::Other(status) => status,
        }
    }

    /// Only an explicit logout is terminal.
    #[must_use]
    pub const fn class(self) -> FailureClass {
        match self {
            Self::LoggedOut => FailureClass::Terminal,
            _ => FailureClass::Recoverable,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoggedOut => f.write_str("logged out"),
            Self::ConnectionClosed => f.write_str("connection closed"),
            Self::ConnectionLost => f.write_str("connection lost"),
            Self::ConnectionReplaced => f.write_str("connection replaced"),
            Self::BadSession => f.write_str("bad session"),
            Self::RestartRequired => f.write_str("restart required"),
            Self::Other(Some(status)) => write!(f, "status {status}"),
            Self::Other(None) => f.write_str("unknown cause"),
        }
    }
}

/// Supervisor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session; waiting to connect.
    Disconnected,
    /// Establishing a session.
    Connecting,
    /// Session established but no registered identity yet.
    AuthPending,
    /// Session open; heartbeat and dispatch running.
    Open,
    /// Terminal failure. No further transitions.
    Halted,
}
