//! Ordered message queue loaded from a text file.

use std::{path::Path, sync::Arc};

use crate::traits::ConfigError;

/// Ordered, immutable sequence of message payloads, indexed `0..len`.
///
/// Cloning is cheap; all clones share the same payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQueue {
    messages: Arc<[String]>,
}

impl MessageQueue {
    /// Build a queue from newline-delimited text.
    ///
    /// Each non-blank line is one payload. A trailing `\r` is stripped so
    /// files written on Windows load the same way.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let messages: Vec<String> = text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect();

        Self {
            messages: messages.into(),
        }
    }

    /// Read a queue from a file, in full.
    ///
    /// # Errors
    /// Returns `MessageFileNotFound` if the file does not exist,
    /// `EmptyQueue` if it holds no payloads, or `Io` for other read failures.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::MessageFileNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let queue = Self::from_text(&text);
        if queue.is_empty() {
            return Err(ConfigError::EmptyQueue(path.to_path_buf()));
        }
        Ok(queue)
    }

    /// Number of payloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the queue holds no payloads.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Payload at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.messages.get(index).map(String::as_str)
    }

    /// Iterate payloads in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for MessageQueue {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let messages: Vec<String> = iter.into_iter().map(Into::into).collect();
        Self {
            messages: messages.into(),
        }
    }
}
