//! Wire protocol between the client and the messaging gateway.
//!
//! One JSON object per line, tagged by `type`.

use relaycast_core::{ConnectionEvent, Credentials, DisconnectReason, GroupInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Longest accepted frame, in bytes.
pub const MAX_FRAME_LENGTH: usize = 1024 * 1024;

/// Frame from client to gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Open the session, resuming stored credentials if any.
    Hello {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credentials: Option<Value>,
    },
    /// Ask for a code to link this device.
    RequestPairingCode { request_id: Uuid, phone_number: String },
    /// Liveness signal.
    Presence { status: PresenceStatus },
    /// Send one text message.
    SendText {
        request_id: Uuid,
        to: String,
        text: String,
    },
    /// List the account's groups.
    FetchGroups { request_id: Uuid },
}

/// Presence advertised by the heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Available,
    Unavailable,
}

/// Connection phase reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Close,
}

/// Frame from gateway to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Handshake accepted.
    Ready { registered: bool },
    /// Connection phase changed.
    ConnectionUpdate {
        connection: ConnectionPhase,
        #[serde(default)]
        status_code: Option<u16>,
    },
    /// Credential material changed.
    CredsUpdate { credentials: Value },
    /// Reply to `request_pairing_code`.
    PairingCode { request_id: Uuid, code: String },
    /// A request succeeded.
    Ack { request_id: Uuid },
    /// A request failed.
    Failed {
        request_id: Uuid,
        #[serde(default)]
        status_code: Option<u16>,
        message: String,
    },
    /// Reply to `fetch_groups`.
    Groups {
        request_id: Uuid,
        groups: Vec<GroupInfo>,
    },
}

/// Reply correlated to a pending request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ack,
    Failed {
        status: Option<u16>,
        message: String,
    },
    PairingCode(String),
    Groups(Vec<GroupInfo>),
}

/// A decoded server frame, split by where it goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Answers the request with this id.
    Reply(Uuid, Reply),
    /// Connection lifecycle event.
    Event(ConnectionEvent),
    /// Nothing to forward.
    Ignored,
}

impl ServerFrame {
    /// Route this frame to a pending request or the event stream.
    #[must_use]
    pub fn into_inbound(self) -> Inbound {
        match self {
            Self::Ready { .. } => Inbound::Ignored,
            Self::ConnectionUpdate {
                connection,
                status_code,
            } => match connection {
                ConnectionPhase::Connecting => Inbound::Ignored,
                ConnectionPhase::Open => Inbound::Event(ConnectionEvent::Open),
                ConnectionPhase::Close => Inbound::Event(ConnectionEvent::Closed(
                    DisconnectReason::from_status(status_code),
                )),
            },
            Self::CredsUpdate { credentials } => {
                Inbound::Event(ConnectionEvent::CredentialsUpdated(Credentials(credentials)))
            }
            Self::PairingCode { request_id, code } => {
                Inbound::Reply(request_id, Reply::PairingCode(code))
            }
            Self::Ack { request_id } => Inbound::Reply(request_id, Reply::Ack),
            Self::Failed {
                request_id,
                status_code,
                message,
            } => Inbound::Reply(
                request_id,
                Reply::Failed {
                    status: status_code,
                    message,
                },
            ),
            Self::Groups { request_id, groups } => {
                Inbound::Reply(request_id, Reply::Groups(groups))
            }
        }
    }
}
