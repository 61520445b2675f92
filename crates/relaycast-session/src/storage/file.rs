//! JSON file progress store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use relaycast_core::traits::{ProgressStore, StoreError};
use serde::{Deserialize, Serialize};

/// Default progress file, relative to the working directory.
pub const DEFAULT_PROGRESS_FILE: &str = "progress.json";

#[derive(Debug, Serialize, Deserialize)]
struct ProgressRecord {
    #[serde(rename = "lastIndex", default)]
    last_index: Option<usize>,
}

/// Progress store backed by a single-record JSON file: `{"lastIndex": n}`.
///
/// Writes go to a sibling temporary file that is renamed over the target,
/// so a crash mid-write leaves either the old or the new record.
#[derive(Debug, Clone)]
pub struct FileProgressStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl FileProgressStore {
    /// Create a store at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        Self {
            path,
            tmp_path: PathBuf::from(tmp),
        }
    }

    /// Path of the progress file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileProgressStore {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_FILE)
    }
}

#[async_trait]
impl ProgressStore for FileProgressStore {
    async fn load(&self) -> Result<usize, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<ProgressRecord>(&raw) {
            Ok(record) => Ok(record.last_index.unwrap_or(0)),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Unreadable progress file, starting from the first message"
                );
                Ok(0)
            }
        }
    }

    async fn save(&self, index: usize) -> Result<(), StoreError> {
        let record = ProgressRecord {
            last_index: Some(index),
        };
        let json = serde_json::to_vec(&record)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.tmp_path, json).await?;
        tokio::fs::rename(&self.tmp_path, &self.path).await?;
        Ok(())
    }
}
