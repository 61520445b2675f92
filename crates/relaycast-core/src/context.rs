//! Run configuration and process-lifetime session context.

use std::{
    sync::{Arc, Mutex, OnceLock, PoisonError},
    time::Duration,
};

use crate::{MessageQueue, Target};

/// What to send, to whom, and how fast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Recipients, in send order.
    pub targets: Vec<Target>,
    /// Payloads, in send order.
    pub queue: MessageQueue,
    /// Pause after every send attempt.
    pub send_delay: Duration,
}

impl RunConfig {
    /// Create a run configuration.
    #[must_use]
    pub const fn new(targets: Vec<Target>, queue: MessageQueue, send_delay: Duration) -> Self {
        Self {
            targets,
            queue,
            send_delay,
        }
    }
}

/// State constructed once per process and shared by the supervisor and the
/// dispatch loop across reconnects.
///
/// The run configuration can be installed exactly once. The warm cursor is
/// the message index the dispatch loop is currently working on.
#[derive(Debug, Default)]
pub struct SessionContext {
    run: OnceLock<Arc<RunConfig>>,
    cursor: Mutex<Option<usize>>,
}

impl SessionContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with a run configuration already in place.
    #[must_use]
    pub fn with_run_config(config: RunConfig) -> Self {
        let ctx = Self::new();
        ctx.install(config);
        ctx
    }

    /// The established run configuration, if any.
    #[must_use]
    pub fn run_config(&self) -> Option<Arc<RunConfig>> {
        self.run.get().cloned()
    }

    /// Install the run configuration. Later calls keep the first value.
    pub fn install(&self, config: RunConfig) -> Arc<RunConfig> {
        Arc::clone(self.run.get_or_init(|| Arc::new(config)))
    }

    /// The in-memory cursor, if dispatch has run in this process.
    #[must_use]
    pub fn cursor(&self) -> Option<usize> {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the message index dispatch is working on.
    pub fn set_cursor(&self, index: usize) {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner) = Some(index);
    }
}
