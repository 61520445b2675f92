//! Connection supervisor: owns the live session and drives reconnection.

use std::{any::Any, sync::Arc, time::Duration};

use relaycast_core::{
    ConnectionEvent, ConnectionState, DisconnectReason, FailureClass, Operator, ProgressStore,
    RunConfig, Session, SessionClient, SessionContext,
    traits::{ConfigError, Established, SessionError},
};
use tokio::{
    sync::watch,
    task::{JoinError, JoinHandle},
};
use tokio_util::sync::CancellationToken;

use crate::{
    backoff::{Backoff, BackoffPolicy},
    dispatch::Dispatcher,
    heartbeat::{DEFAULT_HEARTBEAT_INTERVAL, spawn_heartbeat},
    network::NetworkMonitor,
    setup,
};

/// Supervisor error. Both variants end the process.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Logged out; restart to re-authenticate")]
    LoggedOut,
    #[error("Configuration failed: {0}")]
    Config(#[from] ConfigError),
}

/// Supervisor tuning.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Interval between presence signals on a live session.
    pub heartbeat_interval: Duration,
    /// Delay policy between reconnect attempts.
    pub backoff: BackoffPolicy,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// How a single session ended.
enum SessionEnd {
    Shutdown,
    Disconnected(DisconnectReason),
}

/// Background tasks bound to one session.
#[derive(Default)]
struct SessionTasks {
    heartbeat: Option<JoinHandle<()>>,
    dispatch: Option<JoinHandle<()>>,
    config: Option<Arc<RunConfig>>,
}

impl SessionTasks {
    const fn is_open(&self) -> bool {
        self.heartbeat.is_some()
    }

    async fn reap(&mut self) {
        if let Some(handle) = self.heartbeat.take() {
            log_fault("heartbeat", handle.await);
        }
        if let Some(handle) = self.dispatch.take() {
            log_fault("dispatch", handle.await);
        }
    }
}

/// Owns one logical session to the messaging service.
///
/// On every disconnect the session and its tasks are torn down and replaced.
/// Logout is terminal; every other cause waits for the network, backs off,
/// and reconnects, without limit. Dispatch resumes with the run configuration
/// from the shared [`SessionContext`], so the operator is asked only once per
/// process.
pub struct Supervisor<C>
where
    C: SessionClient,
{
    client: C,
    store: Arc<dyn ProgressStore>,
    operator: Arc<dyn Operator>,
    monitor: NetworkMonitor,
    context: Arc<SessionContext>,
    config: SupervisorConfig,
    state: watch::Sender<ConnectionState>,
}

impl<C> Supervisor<C>
where
    C: SessionClient,
{
    /// Create a new supervisor.
    #[must_use]
    pub fn new(
        client: C,
        store: Arc<dyn ProgressStore>,
        operator: Arc<dyn Operator>,
        monitor: NetworkMonitor,
        context: Arc<SessionContext>,
        config: SupervisorConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            client,
            store,
            operator,
            monitor,
            context,
            config,
            state,
        }
    }

    /// Watch connection state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// The process context shared with dispatch.
    #[must_use]
    pub const fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    /// Run until logout, a configuration failure, or `shutdown`.
    ///
    /// # Errors
    /// Returns `LoggedOut` on a terminal disconnect and `Config` if first-run
    /// configuration fails. Cancelling `shutdown` returns `Ok(())`.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), SupervisorError> {
        let mut backoff = Backoff::new(self.config.backoff.clone());

        loop {
            self.transition(ConnectionState::Connecting);
            let established = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                established = self.client.establish() => established,
            };

            match established {
                Ok(established) => {
                    match self.supervise(established, &shutdown, &mut backoff).await {
                        Ok(SessionEnd::Shutdown) => break,
                        Ok(SessionEnd::Disconnected(reason)) => {
                            tracing::warn!(%reason, status = ?reason.status(), "Connection closed, reconnecting");
                        }
                        Err(e) => {
                            self.transition(ConnectionState::Halted);
                            return Err(e);
                        }
                    }
                }
                Err(SessionError::LoggedOut) => {
                    tracing::error!("Credentials refused during handshake, not reconnecting");
                    self.transition(ConnectionState::Halted);
                    return Err(SupervisorError::LoggedOut);
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt = backoff.attempt(), "Failed to establish session");
                }
            }

            self.transition(ConnectionState::Disconnected);
            if self.monitor.wait_until_ready(&shutdown).await.is_err() {
                break;
            }

            let delay = backoff.next_delay();
            tracing::debug!(delay_ms = delay.as_millis(), "Backing off before reconnect");
            if !sleep_or_cancel(delay, &shutdown).await {
                break;
            }
        }

        self.transition(ConnectionState::Disconnected);
        tracing::info!("Supervisor stopped");
        Ok(())
    }

    async fn supervise(
        &self,
        established: Established<C::Session>,
        shutdown: &CancellationToken,
        backoff: &mut Backoff,
    ) -> Result<SessionEnd, SupervisorError> {
        let Established {
            session,
            mut events,
        } = established;
        let session_token = shutdown.child_token();
        let mut tasks = SessionTasks::default();

        if session.is_registered() {
            tracing::info!("Session already authenticated");
        } else {
            self.transition(ConnectionState::AuthPending);
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {}
                paired = setup::pair_device(&*session, &*self.operator) => {
                    if let Err(e) = paired {
                        tracing::error!(error = %e, "Failed to obtain pairing code");
                    }
                }
            }
        }

        let end = loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break Ok(SessionEnd::Shutdown),
                joined = join_task(&mut tasks.dispatch) => {
                    match joined {
                        Err(e) if e.is_panic() => {
                            tracing::error!(fault = %fault_message(e), "Dispatch task faulted, restarting");
                            if !sleep_or_cancel(backoff.next_delay(), shutdown).await {
                                break Ok(SessionEnd::Shutdown);
                            }
                            if let Some(config) = tasks.config.clone() {
                                tasks.dispatch = Some(self.spawn_dispatch(&session, config, &session_token));
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "Dispatch task cancelled"),
                        Ok(()) => tracing::debug!("Dispatch task finished"),
                    }
                }
                event = events.recv() => match event {
                    Some(ConnectionEvent::Open) => {
                        if tasks.is_open() {
                            tracing::debug!("Ignoring duplicate open event");
                            continue;
                        }
                        self.transition(ConnectionState::Open);
                        backoff.reset();
                        tasks.heartbeat = Some(spawn_heartbeat(
                            Arc::clone(&session),
                            self.config.heartbeat_interval,
                            session_token.clone(),
                        ));

                        let config = match self.run_config(&*session, shutdown).await {
                            Ok(Some(config)) => config,
                            Ok(None) => break Ok(SessionEnd::Shutdown),
                            Err(e) => break Err(e.into()),
                        };
                        tasks.dispatch = Some(self.spawn_dispatch(&session, Arc::clone(&config), &session_token));
                        tasks.config = Some(config);
                    }
                    Some(ConnectionEvent::CredentialsUpdated(credentials)) => {
                        if let Err(e) = self.client.persist_credentials(credentials).await {
                            tracing::warn!(error = %e, "Failed to persist credentials");
                        }
                    }
                    Some(ConnectionEvent::Closed(reason)) => match reason.class() {
                        FailureClass::Terminal => {
                            tracing::error!(%reason, "Session logged out, not reconnecting");
                            break Err(SupervisorError::LoggedOut);
                        }
                        FailureClass::Recoverable => break Ok(SessionEnd::Disconnected(reason)),
                    },
                    None => break Ok(SessionEnd::Disconnected(DisconnectReason::ConnectionLost)),
                },
            }
        };

        session_token.cancel();
        tasks.reap().await;
        session.close().await;
        end
    }

    async fn run_config(
        &self,
        session: &C::Session,
        shutdown: &CancellationToken,
    ) -> Result<Option<Arc<RunConfig>>, ConfigError> {
        if let Some(config) = self.context.run_config() {
            tracing::info!("Resuming with the established run configuration");
            return Ok(Some(config));
        }

        tokio::select! {
            biased;
            () = shutdown.cancelled() => Ok(None),
            config = setup::acquire_run_config(session, &*self.operator) => {
                config.map(|config| Some(self.context.install(config)))
            }
        }
    }

    fn spawn_dispatch(
        &self,
        session: &Arc<C::Session>,
        config: Arc<RunConfig>,
        token: &CancellationToken,
    ) -> JoinHandle<()> {
        let dispatcher = Dispatcher::new(Arc::clone(&self.store), Arc::clone(&self.context));
        let session = Arc::clone(session);
        let token = token.clone();
        tokio::spawn(async move { dispatcher.run(&*session, &config, &token).await })
    }

    fn transition(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::info!(from = ?previous, to = ?next, "Connection state changed");
        }
    }
}

/// Await a task slot; never resolves while the slot is empty.
async fn join_task(slot: &mut Option<JoinHandle<()>>) -> Result<(), JoinError> {
    let Some(handle) = slot.as_mut() else {
        return std::future::pending().await;
    };
    let result = handle.await;
    *slot = None;
    result
}

fn log_fault(task: &str, result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!(task, fault = %fault_message(e), "Task faulted");
        }
    }
}

fn fault_message(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload: Box<dyn Any + Send> = error.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

async fn sleep_or_cancel(delay: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = shutdown.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}
