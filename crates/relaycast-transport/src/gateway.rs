//! TCP client for the messaging gateway.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use futures::{SinkExt, Stream, StreamExt};
use relaycast_core::{
    ConnectionEvent, Credentials, DisconnectReason, FailureClass, GroupInfo, Session,
    SessionClient, Target,
    traits::{Established, SendError, SessionError},
};
use serde_json::Value;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    sync::{mpsc, oneshot},
};
use tokio_util::{
    codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError},
    sync::CancellationToken,
};
use uuid::Uuid;

use crate::protocol::{ClientFrame, Inbound, MAX_FRAME_LENGTH, PresenceStatus, Reply, ServerFrame};

pub const DEFAULT_GATEWAY_ADDRESS: &str = "127.0.0.1:7700";
pub const DEFAULT_AUTH_DIR: &str = "auth_info";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const CREDENTIALS_FILE: &str = "creds.json";
const CHANNEL_CAPACITY: usize = 64;

type Pending = Arc<Mutex<HashMap<Uuid, oneshot::Sender<Reply>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn codec_error(error: LinesCodecError) -> SessionError {
    match error {
        LinesCodecError::Io(e) => SessionError::Io(e),
        other => SessionError::Protocol(other.to_string()),
    }
}

/// Gateway connection settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// `host:port` of the gateway.
    pub address: String,
    /// Directory holding `creds.json`.
    pub auth_dir: PathBuf,
    /// Bound on TCP connect and on the handshake.
    pub connect_timeout: Duration,
    /// Bound on each correlated request.
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_GATEWAY_ADDRESS.to_string(),
            auth_dir: PathBuf::from(DEFAULT_AUTH_DIR),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Session client speaking line-delimited JSON to the gateway.
///
/// Credentials live in `<auth_dir>/creds.json` and are offered on every
/// handshake, so a paired device reconnects without pairing again.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    config: GatewayConfig,
}

impl GatewayClient {
    #[must_use]
    pub const fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    fn credentials_path(&self) -> PathBuf {
        self.config.auth_dir.join(CREDENTIALS_FILE)
    }

    async fn load_credentials(&self) -> Result<Option<Value>, SessionError> {
        let path = self.credentials_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(credentials) => Ok(Some(credentials)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable credentials");
                Ok(None)
            }
        }
    }

    /// Run the handshake over an already-connected stream.
    ///
    /// Events the gateway sends before `ready` are delivered first.
    ///
    /// # Errors
    /// Returns `Timeout` if `ready` does not arrive within the connect
    /// timeout, `LoggedOut` if the gateway refuses the credentials, and
    /// `Handshake` if the gateway hangs up first.
    pub async fn handshake<T>(&self, stream: T) -> Result<Established<GatewaySession>, SessionError>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader =
            FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_FRAME_LENGTH));
        let mut writer = FramedWrite::new(write_half, LinesCodec::new());

        let credentials = self.load_credentials().await?;
        let hello = ClientFrame::Hello { credentials };
        writer
            .send(encode(&hello)?)
            .await
            .map_err(codec_error)?;

        let (registered, early) =
            tokio::time::timeout(self.config.connect_timeout, read_ready(&mut reader))
                .await
                .map_err(|_| SessionError::Timeout)??;
        tracing::debug!(registered, "Gateway handshake complete");

        let (events_tx, events) = mpsc::channel(CHANNEL_CAPACITY.max(early.len()));
        for event in early {
            if let Err(e) = events_tx.try_send(event) {
                tracing::warn!(error = %e, "Dropping event received before ready");
            }
        }

        let (outbound, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let pending = Pending::default();
        let token = CancellationToken::new();

        tokio::spawn(write_frames(writer, outbound_rx, token.clone()));
        tokio::spawn(read_frames(reader, events_tx, Arc::clone(&pending), token.clone()));

        Ok(Established {
            session: Arc::new(GatewaySession {
                registered,
                outbound,
                pending,
                request_timeout: self.config.request_timeout,
                token,
            }),
            events,
        })
    }
}

#[async_trait]
impl SessionClient for GatewayClient {
    type Session = GatewaySession;

    async fn establish(&self) -> Result<Established<GatewaySession>, SessionError> {
        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.address.as_str()),
        )
        .await
        .map_err(|_| SessionError::Timeout)?
        .map_err(|e| SessionError::Connect(e.to_string()))?;
        stream.set_nodelay(true)?;

        tracing::debug!(address = %self.config.address, "Connected to gateway");
        self.handshake(stream).await
    }

    async fn persist_credentials(&self, credentials: Credentials) -> Result<(), SessionError> {
        let path = self.credentials_path();
        let tmp_path = self.config.auth_dir.join(format!("{CREDENTIALS_FILE}.tmp"));
        let bytes = serde_json::to_vec(&credentials)
            .map_err(|e| SessionError::Protocol(e.to_string()))?;

        tokio::fs::create_dir_all(&self.config.auth_dir).await?;
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        tracing::debug!(path = %path.display(), "Credentials saved");
        Ok(())
    }
}

/// A live gateway connection.
pub struct GatewaySession {
    registered: bool,
    outbound: mpsc::Sender<String>,
    pending: Pending,
    request_timeout: Duration,
    token: CancellationToken,
}

impl GatewaySession {
    async fn send_frame(&self, frame: &ClientFrame) -> Result<(), SessionError> {
        self.outbound
            .send(encode(frame)?)
            .await
            .map_err(|_| SessionError::Closed)
    }

    async fn request(&self, build: impl FnOnce(Uuid) -> ClientFrame) -> Result<Reply, SessionError> {
        if self.token.is_cancelled() {
            return Err(SessionError::Closed);
        }

        let request_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(request_id, tx);

        if let Err(e) = self.send_frame(&build(request_id)).await {
            lock(&self.pending).remove(&request_id);
            return Err(e);
        }

        let reply = async {
            tokio::select! {
                reply = rx => reply.map_err(|_| SessionError::Closed),
                () = self.token.cancelled() => Err(SessionError::Closed),
            }
        };
        match tokio::time::timeout(self.request_timeout, reply).await {
            Ok(result) => {
                if result.is_err() {
                    lock(&self.pending).remove(&request_id);
                }
                result
            }
            Err(_) => {
                lock(&self.pending).remove(&request_id);
                Err(SessionError::Timeout)
            }
        }
    }
}

fn unexpected(reply: &Reply) -> SessionError {
    SessionError::Protocol(format!("unexpected reply: {reply:?}"))
}

#[async_trait]
impl Session for GatewaySession {
    fn is_registered(&self) -> bool {
        self.registered
    }

    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, SessionError> {
        let phone_number = phone_number.to_string();
        match self
            .request(|request_id| ClientFrame::RequestPairingCode {
                request_id,
                phone_number,
            })
            .await?
        {
            Reply::PairingCode(code) => Ok(code),
            Reply::Failed { status, message } => Err(SessionError::Rejected { status, message }),
            other => Err(unexpected(&other)),
        }
    }

    async fn send_presence(&self) -> Result<(), SessionError> {
        self.send_frame(&ClientFrame::Presence {
            status: PresenceStatus::Available,
        })
        .await
    }

    async fn send_message(&self, target: &Target, payload: &str) -> Result<(), SendError> {
        let to = target.address().to_string();
        let text = payload.to_string();
        let reply = self
            .request(|request_id| ClientFrame::SendText {
                request_id,
                to,
                text,
            })
            .await;

        match reply {
            Ok(Reply::Ack) => Ok(()),
            Ok(Reply::Failed { status, message }) => Err(SendError::new(status, message)),
            Ok(other) => Err(SendError::new(None, unexpected(&other).to_string())),
            Err(e @ SessionError::Timeout) => {
                Err(SendError::new(DisconnectReason::ConnectionLost.status(), e.to_string()))
            }
            Err(e @ SessionError::Closed) => {
                Err(SendError::new(DisconnectReason::ConnectionClosed.status(), e.to_string()))
            }
            Err(e) => Err(SendError::new(None, e.to_string())),
        }
    }

    async fn fetch_groups(&self) -> Result<Vec<GroupInfo>, SessionError> {
        match self
            .request(|request_id| ClientFrame::FetchGroups { request_id })
            .await?
        {
            Reply::Groups(groups) => Ok(groups),
            Reply::Failed { status, message } => Err(SessionError::Rejected { status, message }),
            other => Err(unexpected(&other)),
        }
    }

    async fn close(&self) {
        self.token.cancel();
    }
}

fn encode(frame: &ClientFrame) -> Result<String, SessionError> {
    serde_json::to_string(frame).map_err(|e| SessionError::Protocol(e.to_string()))
}

async fn read_ready<S>(reader: &mut S) -> Result<(bool, Vec<ConnectionEvent>), SessionError>
where
    S: Stream<Item = Result<String, LinesCodecError>> + Unpin,
{
    let mut early = Vec::new();
    loop {
        let Some(line) = reader.next().await else {
            return Err(SessionError::Handshake(
                "gateway closed the connection".to_string(),
            ));
        };
        let frame: ServerFrame = serde_json::from_str(&line.map_err(codec_error)?)
            .map_err(|e| SessionError::Handshake(e.to_string()))?;

        match frame {
            ServerFrame::Ready { registered } => return Ok((registered, early)),
            other => match other.into_inbound() {
                Inbound::Event(ConnectionEvent::Closed(reason))
                    if reason.class() == FailureClass::Terminal =>
                {
                    return Err(SessionError::LoggedOut);
                }
                Inbound::Event(event) => early.push(event),
                Inbound::Reply(request_id, _) => {
                    tracing::debug!(%request_id, "Dropping reply received before ready");
                }
                Inbound::Ignored => {}
            },
        }
    }
}

async fn write_frames<W>(
    mut writer: FramedWrite<W, LinesCodec>,
    mut outbound: mpsc::Receiver<String>,
    token: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            line = outbound.recv() => {
                let Some(line) = line else { break };
                if let Err(e) = writer.send(line).await {
                    tracing::warn!(error = %e, "Gateway write failed");
                    break;
                }
            }
        }
    }
    let _ = SinkExt::<String>::close(&mut writer).await;
}

async fn read_frames<R>(
    mut reader: FramedRead<R, LinesCodec>,
    events: mpsc::Sender<ConnectionEvent>,
    pending: Pending,
    token: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut close_reported = false;
    loop {
        let line = tokio::select! {
            biased;
            () = token.cancelled() => break,
            line = reader.next() => line,
        };

        let line = match line {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Gateway read failed");
                break;
            }
            None => {
                tracing::debug!("Gateway closed the stream");
                break;
            }
        };

        let frame: ServerFrame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed frame");
                continue;
            }
        };

        match frame.into_inbound() {
            Inbound::Reply(request_id, reply) => {
                let waiter = lock(&pending).remove(&request_id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(reply);
                    }
                    None => tracing::debug!(%request_id, "Reply for unknown request"),
                }
            }
            Inbound::Event(event) => {
                close_reported |= matches!(event, ConnectionEvent::Closed(_));
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Inbound::Ignored => {}
        }
    }

    // The connection is dead either way; fail in-flight and future requests.
    let lost = !token.is_cancelled();
    token.cancel();
    lock(&pending).clear();
    if lost && !close_reported {
        let _ = events
            .send(ConnectionEvent::Closed(DisconnectReason::ConnectionLost))
            .await;
    }
}
