//! Terminal operator backed by `dialoguer`.

use std::io::ErrorKind;

use async_trait::async_trait;
use dialoguer::Input;
use relaycast_core::{Operator, traits::PromptError};

/// Asks on stdin/stdout. Each prompt runs on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalOperator;

#[async_trait]
impl Operator for TerminalOperator {
    async fn ask(&self, question: &str) -> Result<String, PromptError> {
        let prompt = question.to_string();
        let answer = tokio::task::spawn_blocking(move || {
            Input::<String>::new()
                .with_prompt(prompt)
                .allow_empty(true)
                .interact_text()
        })
        .await
        .map_err(|e| PromptError::Failed(e.to_string()))?;

        match answer {
            Ok(answer) => Ok(answer.trim().to_string()),
            Err(dialoguer::Error::IO(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                Err(PromptError::Closed)
            }
            Err(e) => Err(PromptError::Failed(e.to_string())),
        }
    }

    fn show(&self, line: &str) {
        println!("{line}");
    }
}
