//! Core traits for sessions, progress storage and operator interaction.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{ConnectionEvent, Credentials, GroupInfo, Target};

/// Send status codes the service returns for transient conditions
/// (request timeout, connection closed mid-request).
pub const TRANSIENT_SEND_STATUSES: [u16; 2] = [408, 428];

/// Session error.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Connect failed: {0}")]
    Connect(String),
    #[error("Handshake failed: {0}")]
    Handshake(String),
    #[error("Request timed out")]
    Timeout,
    #[error("Session closed")]
    Closed,
    #[error("Logged out by the service")]
    LoggedOut,
    #[error("Request rejected ({status:?}): {message}")]
    Rejected {
        status: Option<u16>,
        message: String,
    },
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-message send failure.
#[derive(Debug, Clone, Error)]
#[error("Send failed ({status:?}): {message}")]
pub struct SendError {
    /// Status code reported by the service, if any.
    pub status: Option<u16>,
    /// Human-readable cause.
    pub message: String,
}

impl SendError {
    /// Create a send error.
    #[must_use]
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Whether the status is one of the expected transient codes.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.status
            .is_some_and(|status| TRANSIENT_SEND_STATUSES.contains(&status))
    }
}

/// A live session and the events it emits.
pub struct Established<S> {
    /// Shared session handle.
    pub session: Arc<S>,
    /// Connection-state events, in order.
    pub events: mpsc::Receiver<ConnectionEvent>,
}

/// Live connection to the messaging service.
///
/// Replaced wholesale on every reconnect.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Whether the session carries a registered identity.
    fn is_registered(&self) -> bool;

    /// Request a pairing code for linking this device.
    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, SessionError>;

    /// Send a liveness signal.
    async fn send_presence(&self) -> Result<(), SessionError>;

    /// Send one text payload to one target.
    async fn send_message(&self, target: &Target, payload: &str) -> Result<(), SendError>;

    /// Fetch the groups this account participates in.
    async fn fetch_groups(&self) -> Result<Vec<GroupInfo>, SessionError>;

    /// Tear down the underlying connection.
    async fn close(&self);
}

/// Factory for sessions.
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Concrete session type.
    type Session: Session;

    /// Establish a new session using the persisted auth state.
    async fn establish(&self) -> Result<Established<Self::Session>, SessionError>;

    /// Persist updated credential material.
    async fn persist_credentials(&self, credentials: Credentials) -> Result<(), SessionError>;
}

#[async_trait]
impl<T: SessionClient> SessionClient for Arc<T> {
    type Session = T::Session;

    async fn establish(&self) -> Result<Established<Self::Session>, SessionError> {
        (**self).establish().await
    }

    async fn persist_credentials(&self, credentials: Credentials) -> Result<(), SessionError> {
        (**self).persist_credentials(credentials).await
    }
}

/// Progress store error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable single-value progress cursor.
///
/// Single writer: only the dispatch loop saves.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Load the persisted cursor. Missing or unreadable records yield 0.
    async fn load(&self) -> Result<usize, StoreError>;

    /// Persist the cursor. Saving the same value twice is a no-op.
    async fn save(&self, index: usize) -> Result<(), StoreError>;
}

/// Operator prompt error.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Input closed")]
    Closed,
    #[error("Prompt failed: {0}")]
    Failed(String),
}

/// Operator interaction.
#[async_trait]
pub trait Operator: Send + Sync {
    /// Ask a question and return the trimmed answer.
    async fn ask(&self, question: &str) -> Result<String, PromptError>;

    /// Show a line of information.
    fn show(&self, line: &str);
}

/// First-run configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid choice: {0:?}")]
    InvalidChoice(String),
    #[error("Invalid number: {0:?}")]
    InvalidNumber(String),
    #[error("Invalid target: {0:?}")]
    InvalidTarget(String),
    #[error("No targets configured")]
    NoTargets,
    #[error("Message file not found: {}", .0.display())]
    MessageFileNotFound(PathBuf),
    #[error("Message file has no messages: {}", .0.display())]
    EmptyQueue(PathBuf),
    #[error("Failed to fetch groups: {0}")]
    GroupDirectory(#[source] SessionError),
    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
