//! Periodic presence signals that keep an idle session alive.

use std::{sync::Arc, time::Duration};

use relaycast_core::Session;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default interval between presence signals.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Shortest interval a heartbeat will tick at.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Spawn a heartbeat bound to `session`.
///
/// The first signal goes out one full `interval` after spawning. Runs until
/// `token` is cancelled. Presence failures are best-effort and dropped.
/// `interval` is raised to [`MIN_HEARTBEAT_INTERVAL`].
pub fn spawn_heartbeat<S: Session>(
    session: Arc<S>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    let interval = interval.max(MIN_HEARTBEAT_INTERVAL);
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    let _ = session.send_presence().await;
                }
            }
        }
    })
}
