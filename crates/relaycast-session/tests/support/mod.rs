//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use relaycast_core::{
    ConnectionEvent, Credentials, GroupInfo, Operator, Session, SessionClient, Target,
    traits::{Established, PromptError, SendError, SessionError},
};
use relaycast_session::Probe;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Session that records every send attempt.
#[derive(Default)]
pub struct MockSession {
    registered: bool,
    attempts: Mutex<Vec<(String, String)>>,
    failures: Mutex<HashMap<usize, SendError>>,
    panic_on: Option<usize>,
    stop_after: Option<(usize, CancellationToken)>,
    groups: Option<Vec<GroupInfo>>,
    pairing_requests: Mutex<Vec<String>>,
    presence: AtomicUsize,
    presence_fails: bool,
    closed: AtomicBool,
}

impl MockSession {
    pub fn registered() -> Self {
        Self {
            registered: true,
            groups: Some(Vec::new()),
            ..Self::default()
        }
    }

    pub fn unregistered() -> Self {
        Self {
            registered: false,
            groups: Some(Vec::new()),
            ..Self::default()
        }
    }

    /// Fail the 0-indexed send attempt `attempt` with `status`.
    pub fn fail_attempt(self, attempt: usize, status: Option<u16>) -> Self {
        lock(&self.failures).insert(attempt, SendError::new(status, "scripted failure"));
        self
    }

    /// Panic on the 0-indexed send attempt `attempt`.
    pub fn panic_on(mut self, attempt: usize) -> Self {
        self.panic_on = Some(attempt);
        self
    }

    /// Cancel `token` once `attempts` sends have been attempted.
    pub fn stop_after(mut self, attempts: usize, token: CancellationToken) -> Self {
        self.stop_after = Some((attempts, token));
        self
    }

    pub fn with_groups(mut self, groups: Vec<GroupInfo>) -> Self {
        self.groups = Some(groups);
        self
    }

    pub fn without_groups(mut self) -> Self {
        self.groups = None;
        self
    }

    pub fn failing_presence(mut self) -> Self {
        self.presence_fails = true;
        self
    }

    /// `(target, payload)` for every attempt, in order.
    pub fn attempts(&self) -> Vec<(String, String)> {
        lock(&self.attempts).clone()
    }

    /// Payload of every attempt, in order.
    pub fn payloads(&self) -> Vec<String> {
        self.attempts().into_iter().map(|(_, p)| p).collect()
    }

    pub fn pairing_requests(&self) -> Vec<String> {
        lock(&self.pairing_requests).clone()
    }

    pub fn presence_count(&self) -> usize {
        self.presence.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for MockSession {
    fn is_registered(&self) -> bool {
        self.registered
    }

    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, SessionError> {
        lock(&self.pairing_requests).push(phone_number.to_string());
        Ok("ABCD-1234".to_string())
    }

    async fn send_presence(&self) -> Result<(), SessionError> {
        self.presence.fetch_add(1, Ordering::SeqCst);
        if self.presence_fails {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    async fn send_message(&self, target: &Target, payload: &str) -> Result<(), SendError> {
        let attempt = {
            let mut attempts = lock(&self.attempts);
            attempts.push((target.address().to_string(), payload.to_string()));
            attempts.len() - 1
        };

        if self.panic_on == Some(attempt) {
            panic!("scripted panic on attempt {attempt}");
        }
        if let Some((limit, token)) = &self.stop_after {
            if attempt + 1 >= *limit {
                token.cancel();
            }
        }

        match lock(&self.failures).remove(&attempt) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn fetch_groups(&self) -> Result<Vec<GroupInfo>, SessionError> {
        self.groups
            .clone()
            .ok_or_else(|| SessionError::Protocol("groups unavailable".to_string()))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// One scripted `establish` outcome.
pub enum Plan {
    Fail(SessionError),
    Connect {
        session: Arc<MockSession>,
        events: Vec<ConnectionEvent>,
        keep_open: bool,
    },
}

impl Plan {
    /// A session that emits `events` and keeps its event stream open.
    pub fn open(session: Arc<MockSession>, events: Vec<ConnectionEvent>) -> Self {
        Self::Connect {
            session,
            events,
            keep_open: true,
        }
    }

    /// A session whose event stream ends after `events`.
    pub fn then_drop(session: Arc<MockSession>, events: Vec<ConnectionEvent>) -> Self {
        Self::Connect {
            session,
            events,
            keep_open: false,
        }
    }
}

/// Session client that plays back scripted plans.
#[derive(Default)]
pub struct MockClient {
    plans: Mutex<VecDeque<Plan>>,
    senders: Mutex<Vec<mpsc::Sender<ConnectionEvent>>>,
    establishes: AtomicUsize,
    credentials: Mutex<Vec<Credentials>>,
}

impl MockClient {
    pub fn new(plans: impl IntoIterator<Item = Plan>) -> Arc<Self> {
        Arc::new(Self {
            plans: Mutex::new(plans.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn establish_count(&self) -> usize {
        self.establishes.load(Ordering::SeqCst)
    }

    pub fn persisted_credentials(&self) -> Vec<Credentials> {
        lock(&self.credentials).clone()
    }

    /// Push an event into the `n`th kept-open session.
    pub async fn emit(&self, n: usize, event: ConnectionEvent) {
        let sender = lock(&self.senders)[n].clone();
        let _ = sender.send(event).await;
    }
}

#[async_trait]
impl SessionClient for MockClient {
    type Session = MockSession;

    async fn establish(&self) -> Result<Established<MockSession>, SessionError> {
        self.establishes.fetch_add(1, Ordering::SeqCst);
        let plan = lock(&self.plans).pop_front();

        match plan {
            None => Err(SessionError::Connect("no more scripted sessions".to_string())),
            Some(Plan::Fail(e)) => Err(e),
            Some(Plan::Connect {
                session,
                events,
                keep_open,
            }) => {
                let (tx, rx) = mpsc::channel(64);
                for event in events {
                    let _ = tx.try_send(event);
                }
                if keep_open {
                    lock(&self.senders).push(tx);
                }
                Ok(Established {
                    session,
                    events: rx,
                })
            }
        }
    }

    async fn persist_credentials(&self, credentials: Credentials) -> Result<(), SessionError> {
        lock(&self.credentials).push(credentials);
        Ok(())
    }
}

/// Operator that answers from a script and records everything.
#[derive(Default)]
pub struct ScriptedOperator {
    answers: Mutex<VecDeque<String>>,
    questions: Mutex<Vec<String>>,
    shown: Mutex<Vec<String>>,
}

impl ScriptedOperator {
    pub fn new<I, S>(answers: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            ..Self::default()
        })
    }

    pub fn questions(&self) -> Vec<String> {
        lock(&self.questions).clone()
    }

    pub fn shown(&self) -> Vec<String> {
        lock(&self.shown).clone()
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn ask(&self, question: &str) -> Result<String, PromptError> {
        lock(&self.questions).push(question.to_string());
        lock(&self.answers).pop_front().ok_or(PromptError::Closed)
    }

    fn show(&self, line: &str) {
        lock(&self.shown).push(line.to_string());
    }
}

/// Probe that is unreachable for the first `failures` calls.
pub struct CountingProbe {
    failures: usize,
    calls: AtomicUsize,
}

impl CountingProbe {
    pub fn up() -> Arc<Self> {
        Self::down_for(0)
    }

    pub fn down_for(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for CountingProbe {
    async fn reachable(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst) >= self.failures
    }
}

/// A message file holding `lines`, kept alive by the returned handle.
pub fn message_file(lines: &[&str]) -> tempfile::NamedTempFile {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}

pub fn contact(number: &str) -> Target {
    Target::contact(number).unwrap()
}
