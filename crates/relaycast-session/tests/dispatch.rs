mod support;

use std::{sync::Arc, time::Duration};

use relaycast_core::{MessageQueue, ProgressStore, RunConfig, SessionContext};
use relaycast_session::{Dispatcher, storage::MemoryProgressStore};
use support::{MockSession, contact};
use tokio_util::sync::CancellationToken;

const T1: &str = "111@s.whatsapp.net";
const T2: &str = "222@s.whatsapp.net";

fn config(messages: &[&str], delay: Duration) -> RunConfig {
    RunConfig::new(
        vec![contact("111"), contact("222")],
        messages.iter().copied().collect::<MessageQueue>(),
        delay,
    )
}

fn pair(target: &str, payload: &str) -> (String, String) {
    (target.to_string(), payload.to_string())
}

async fn run_until_stopped(
    session: &MockSession,
    store: Arc<MemoryProgressStore>,
    context: Arc<SessionContext>,
    config: &RunConfig,
    token: &CancellationToken,
) {
    Dispatcher::new(store, context).run(session, config, token).await;
}

#[tokio::test]
async fn test_sends_every_message_to_every_target_then_repeats() {
    let token = CancellationToken::new();
    let session = MockSession::registered().stop_after(8, token.clone());
    let store = Arc::new(MemoryProgressStore::new());
    let config = config(&["A", "B", "C"], Duration::ZERO);

    run_until_stopped(&session, store.clone(), Arc::new(SessionContext::new()), &config, &token).await;

    assert_eq!(
        session.attempts(),
        vec![
            pair(T1, "A"),
            pair(T2, "A"),
            pair(T1, "B"),
            pair(T2, "B"),
            pair(T1, "C"),
            pair(T2, "C"),
            pair(T1, "A"),
            pair(T2, "A"),
        ]
    );
    // 0,0,1,1,2,2 for the first pass, the reset to 0, then the second pass.
    assert_eq!(store.writes(), vec![0, 0, 1, 1, 2, 2, 0, 0, 0]);
}

#[tokio::test]
async fn test_cursor_is_monotonic_within_a_pass() {
    let token = CancellationToken::new();
    let session = MockSession::registered().stop_after(13, token.clone());
    let store = Arc::new(MemoryProgressStore::new());
    let config = config(&["A", "B", "C"], Duration::ZERO);

    run_until_stopped(&session, store.clone(), Arc::new(SessionContext::new()), &config, &token).await;

    let writes = store.writes();
    for w in writes.windows(2) {
        if w[1] < w[0] {
            // A decrease is only ever the reset after the last message.
            assert_eq!(w, [2, 0]);
        }
    }
    assert_eq!(writes.iter().filter(|&&w| w == 0).count(), 2 + 1 + 2 + 1 + 1);
}

#[tokio::test]
async fn test_cold_start_resumes_at_stored_message() {
    for k in 0..3 {
        let token = CancellationToken::new();
        let session = MockSession::registered().stop_after(2, token.clone());
        let store = Arc::new(MemoryProgressStore::with_cursor(k));
        let config = config(&["A", "B", "C"], Duration::ZERO);
        let expected = ["A", "B", "C"][k];

        run_until_stopped(&session, store.clone(), Arc::new(SessionContext::new()), &config, &token).await;

        assert_eq!(
            session.attempts(),
            vec![pair(T1, expected), pair(T2, expected)],
            "stored cursor {k}"
        );
        assert_eq!(store.writes(), vec![k, k]);
    }
}

#[tokio::test]
async fn test_stored_cursor_past_end_restarts_queue() {
    let token = CancellationToken::new();
    let session = MockSession::registered().stop_after(1, token.clone());
    let store = Arc::new(MemoryProgressStore::with_cursor(9));
    let config = config(&["A", "B"], Duration::ZERO);

    run_until_stopped(&session, store, Arc::new(SessionContext::new()), &config, &token).await;

    assert_eq!(session.payloads(), vec!["A"]);
}

#[tokio::test]
async fn test_warm_cursor_wins_over_store() {
    let token = CancellationToken::new();
    let session = MockSession::registered().stop_after(2, token.clone());
    let store = Arc::new(MemoryProgressStore::with_cursor(0));
    let context = Arc::new(SessionContext::new());
    context.set_cursor(2);
    let config = config(&["A", "B", "C"], Duration::ZERO);

    run_until_stopped(&session, store.clone(), context.clone(), &config, &token).await;

    assert_eq!(session.payloads(), vec!["C", "C"]);
    assert_eq!(context.cursor(), Some(2));
}

#[tokio::test]
async fn test_send_failures_do_not_halt_the_loop() {
    let token = CancellationToken::new();
    let session = MockSession::registered()
        .fail_attempt(0, Some(408))
        .fail_attempt(1, Some(500))
        .fail_attempt(3, None)
        .stop_after(5, token.clone());
    let store = Arc::new(MemoryProgressStore::new());
    let config = config(&["A", "B", "C"], Duration::ZERO);

    run_until_stopped(&session, store.clone(), Arc::new(SessionContext::new()), &config, &token).await;

    assert_eq!(session.payloads(), vec!["A", "A", "B", "B", "C"]);
    // Only successful sends advance the stored cursor.
    assert_eq!(store.writes(), vec![1, 2]);
    assert_eq!(store.load().await.unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_waits_delay_after_every_attempt() {
    let token = CancellationToken::new();
    let session = MockSession::registered()
        .fail_attempt(1, Some(428))
        .stop_after(3, token.clone());
    let store = Arc::new(MemoryProgressStore::new());
    let config = config(&["A", "B"], Duration::from_secs(10));
    let start = tokio::time::Instant::now();

    run_until_stopped(&session, store, Arc::new(SessionContext::new()), &config, &token).await;

    // Sends at t=0, 10 and 20; the failed second attempt still waited.
    assert_eq!(session.attempts().len(), 3);
    assert_eq!(start.elapsed(), Duration::from_secs(20));
}

#[tokio::test]
async fn test_cancelled_before_start_sends_nothing() {
    let token = CancellationToken::new();
    token.cancel();
    let session = MockSession::registered();
    let config = config(&["A"], Duration::ZERO);

    run_until_stopped(
        &session,
        Arc::new(MemoryProgressStore::new()),
        Arc::new(SessionContext::new()),
        &config,
        &token,
    )
    .await;

    assert!(session.attempts().is_empty());
}

#[tokio::test]
async fn test_empty_target_set_idles_until_cancelled() {
    let token = CancellationToken::new();
    let session = MockSession::registered();
    let config = RunConfig::new(
        Vec::new(),
        MessageQueue::from_text("A"),
        Duration::ZERO,
    );

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::task::yield_now().await;
        canceller.cancel();
    });

    run_until_stopped(
        &session,
        Arc::new(MemoryProgressStore::new()),
        Arc::new(SessionContext::new()),
        &config,
        &token,
    )
    .await;

    assert!(session.attempts().is_empty());
}
