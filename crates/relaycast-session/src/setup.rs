//! First-run operator interaction: device pairing and run configuration.

use std::{path::Path, time::Duration};

use relaycast_core::{
    MessageQueue, Operator, RunConfig, Session, Target,
    traits::{ConfigError, PromptError, SessionError},
};

/// Pairing error.
#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Ask for the account's phone number and show the pairing code for it.
///
/// # Errors
/// Returns error if the prompt fails or the session rejects the request.
pub async fn pair_device<S: Session + ?Sized>(
    session: &S,
    operator: &dyn Operator,
) -> Result<(), PairingError> {
    let phone_number = operator
        .ask("Enter your phone number for pairing (e.g. 40748427351)")
        .await?;
    let code = session.request_pairing_code(&phone_number).await?;

    operator.show(&format!("Pairing code: {code}"));
    operator.show("Open WhatsApp and enter this code under 'Linked Devices'.");
    Ok(())
}

/// Prompt the operator for targets, the message file and the send delay.
///
/// # Errors
/// Returns a `ConfigError` on an invalid selection, unusable input, a
/// missing or empty message file, or a failed group fetch.
pub async fn acquire_run_config<S: Session + ?Sized>(
    session: &S,
    operator: &dyn Operator,
) -> Result<RunConfig, ConfigError> {
    operator.show("Where would you like to send messages?");
    operator.show("[1] Contacts");
    operator.show("[2] Groups");

    let choice = operator.ask("Enter your choice (1 or 2)").await?;
    let targets = match choice.as_str() {
        "1" => ask_contacts(operator).await?,
        "2" => ask_groups(session, operator).await?,
        _ => return Err(ConfigError::InvalidChoice(choice)),
    };
    if targets.is_empty() {
        return Err(ConfigError::NoTargets);
    }

    let path = operator
        .ask("Enter the path to your text file (e.g. messages.txt)")
        .await?;
    let queue = MessageQueue::load(Path::new(&path)).await?;

    let delay = operator
        .ask("Enter the delay in seconds between messages")
        .await?;
    let delay_secs: u64 = delay
        .parse()
        .map_err(|_| ConfigError::InvalidNumber(delay.clone()))?;

    tracing::info!(
        targets = targets.len(),
        messages = queue.len(),
        delay_secs,
        "Run configured"
    );
    Ok(RunConfig::new(targets, queue, Duration::from_secs(delay_secs)))
}

async fn ask_count(operator: &dyn Operator, question: &str) -> Result<usize, ConfigError> {
    let answer = operator.ask(question).await?;
    answer
        .parse()
        .map_err(|_| ConfigError::InvalidNumber(answer.clone()))
}

async fn ask_contacts(operator: &dyn Operator) -> Result<Vec<Target>, ConfigError> {
    let count = ask_count(operator, "How many contacts?").await?;
    let mut targets = Vec::new();
    for i in 1..=count {
        let number = operator
            .ask(&format!(
                "Enter phone number for contact {i} (without +, e.g. 40748427351)"
            ))
            .await?;
        targets.push(Target::contact(&number)?);
    }
    Ok(targets)
}

async fn ask_groups<S: Session + ?Sized>(
    session: &S,
    operator: &dyn Operator,
) -> Result<Vec<Target>, ConfigError> {
    operator.show("Fetching group information...");
    let mut groups = session
        .fetch_groups()
        .await
        .map_err(ConfigError::GroupDirectory)?;
    groups.sort_by(|a, b| a.subject.cmp(&b.subject));

    if groups.is_empty() {
        operator.show("No groups found for this account.");
    } else {
        operator.show("Available groups:");
        for group in &groups {
            operator.show(&format!("{} - ID: {}", group.subject, group.id));
        }
    }

    let count = ask_count(operator, "How many groups?").await?;
    let mut targets = Vec::new();
    for i in 1..=count {
        let id = operator
            .ask(&format!(
                "Enter group ID for group {i} (e.g. 1234567890-123456@g.us)"
            ))
            .await?;
        targets.push(Target::group(&id)?);
    }
    Ok(targets)
}
