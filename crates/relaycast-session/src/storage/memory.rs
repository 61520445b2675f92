//! In-memory progress store.

use std::{collections::VecDeque, sync::RwLock};

use async_trait::async_trait;
use relaycast_core::traits::{ProgressStore, StoreError};

/// Most recent writes kept for [`MemoryProgressStore::writes`].
pub const WRITE_HISTORY_LIMIT: usize = 1024;

#[derive(Debug, Default)]
struct Inner {
    current: Option<usize>,
    writes: VecDeque<usize>,
}

/// In-memory progress store, mainly for tests.
///
/// Keeps the last [`WRITE_HISTORY_LIMIT`] writes so callers can inspect the
/// cursor history. Data is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    inner: RwLock<Inner>,
}

impl MemoryProgressStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `index`, as if persisted by an
    /// earlier run.
    #[must_use]
    pub fn with_cursor(index: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                current: Some(index),
                writes: VecDeque::new(),
            }),
        }
    }

    /// Recent values saved, oldest first.
    #[must_use]
    pub fn writes(&self) -> Vec<usize> {
        self.inner
            .read()
            .map(|inner| inner.writes.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The current value, if anything was ever stored.
    #[must_use]
    pub fn current(&self) -> Option<usize> {
        self.inner.read().ok().and_then(|inner| inner.current)
    }
}

fn poisoned(e: impl std::fmt::Display) -> StoreError {
    StoreError::Io(std::io::Error::other(e.to_string()))
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn load(&self) -> Result<usize, StoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.current.unwrap_or(0))
    }

    async fn save(&self, index: usize) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.current = Some(index);
        if inner.writes.len() == WRITE_HISTORY_LIMIT {
            inner.writes.pop_front();
        }
        inner.writes.push_back(index);
        Ok(())
    }
}
