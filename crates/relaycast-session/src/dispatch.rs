//! Resumable dispatch of the message queue to every target.
//!
//! The loop walks message indices in order and sends each message to every
//! target before moving on. After each successful send the message index is
//! persisted, so a restarted process resumes at that message and re-sends it
//! to all targets. Delivery is at-least-once per message: a crash while a
//! message is partway through its targets repeats it for the targets that
//! already received it.
//!
//! Once the queue is exhausted the cursor is reset to 0 and the whole queue
//! is sent again, indefinitely.

use std::{sync::Arc, time::Duration};

use relaycast_core::{ProgressStore, RunConfig, Session, SessionContext};
use tokio_util::sync::CancellationToken;

/// Drives sends for one live session.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn ProgressStore>,
    context: Arc<SessionContext>,
}

impl Dispatcher {
    /// Create a dispatcher over a progress store and the process context.
    #[must_use]
    pub fn new(store: Arc<dyn ProgressStore>, context: Arc<SessionContext>) -> Self {
        Self { store, context }
    }

    /// Send until `token` is cancelled.
    ///
    /// Per-send failures never stop the loop. Transient statuses are logged
    /// at debug level only; anything else is a warning.
    pub async fn run<S: Session + ?Sized>(
        &self,
        session: &S,
        config: &RunConfig,
        token: &CancellationToken,
    ) {
        let len = config.queue.len();
        if len == 0 || config.targets.is_empty() {
            tracing::warn!(
                messages = len,
                targets = config.targets.len(),
                "Nothing to dispatch"
            );
            token.cancelled().await;
            return;
        }

        let mut index = self.start_index(len).await;
        tracing::info!(index, messages = len, targets = config.targets.len(), "Dispatch started");

        loop {
            while let Some(payload) = config.queue.get(index) {
                self.context.set_cursor(index);

                for target in &config.targets {
                    let result = tokio::select! {
                        biased;
                        () = token.cancelled() => return,
                        result = session.send_message(target, payload) => result,
                    };

                    match result {
                        Ok(()) => {
                            tracing::info!(%target, index, "Message sent");
                            self.persist(index).await;
                        }
                        Err(e) if e.is_transient() => {
                            tracing::debug!(%target, index, status = ?e.status, "Transient send failure");
                        }
                        Err(e) => {
                            tracing::warn!(%target, index, error = %e, "Send failed");
                        }
                    }

                    if !pause(config.send_delay, token).await {
                        return;
                    }
                }

                index += 1;
            }

            index = 0;
            self.context.set_cursor(0);
            self.persist(0).await;
            tracing::info!("Queue exhausted, starting over");
        }
    }

    /// Warm cursor if this process already dispatched, else the stored one.
    async fn start_index(&self, len: usize) -> usize {
        let index = match self.context.cursor() {
            Some(index) => index,
            None => self.store.load().await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to load progress, starting from the first message");
                0
            }),
        };

        if index < len {
            index
        } else {
            tracing::info!(index, messages = len, "Stored progress is past the queue end");
            0
        }
    }

    async fn persist(&self, index: usize) {
        if let Err(e) = self.store.save(index).await {
            tracing::warn!(index, error = %e, "Failed to persist progress");
        }
    }
}

/// Sleep for `delay` unless cancelled. Returns false on cancellation.
async fn pause(delay: Duration, token: &CancellationToken) -> bool {
    if delay.is_zero() {
        tokio::task::yield_now().await;
        return !token.is_cancelled();
    }

    tokio::select! {
        biased;
        () = token.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}
