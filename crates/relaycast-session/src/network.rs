//! Network readiness polling.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Default host resolved to confirm outbound connectivity.
pub const DEFAULT_PROBE_HOST: &str = "google.com";

/// Default interval between probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// The wait was cancelled before the network came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Wait cancelled")]
pub struct Cancelled;

/// A single reachability check.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Whether the network looks reachable right now.
    async fn reachable(&self) -> bool;
}

/// Probe that resolves a well-known external hostname.
#[derive(Debug, Clone)]
pub struct DnsProbe {
    host: String,
    timeout: Duration,
}

impl DnsProbe {
    /// Create a probe for `host`, giving each lookup at most `timeout`.
    #[must_use]
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            timeout,
        }
    }
}

impl Default for DnsProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_HOST, DEFAULT_POLL_INTERVAL)
    }
}

#[async_trait]
impl Probe for DnsProbe {
    async fn reachable(&self) -> bool {
        let lookup = tokio::net::lookup_host((self.host.as_str(), 443));
        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(mut addrs)) => addrs.next().is_some(),
            Ok(Err(e)) => {
                tracing::debug!(host = %self.host, error = %e, "Probe lookup failed");
                false
            }
            Err(_) => {
                tracing::debug!(host = %self.host, "Probe lookup timed out");
                false
            }
        }
    }
}

/// Shortest poll interval a monitor will use.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Blocks until the network is reachable again.
#[derive(Clone)]
pub struct NetworkMonitor {
    probe: Arc<dyn Probe>,
    poll_interval: Duration,
}

impl NetworkMonitor {
    /// Create a monitor. `poll_interval` is raised to [`MIN_POLL_INTERVAL`].
    #[must_use]
    pub fn new(probe: Arc<dyn Probe>, poll_interval: Duration) -> Self {
        Self {
            probe,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// Probe now, then every poll interval, until a probe succeeds.
    ///
    /// There is no timeout; only `shutdown` ends the wait early.
    ///
    /// # Errors
    /// Returns `Cancelled` if `shutdown` fires first.
    pub async fn wait_until_ready(&self, shutdown: &CancellationToken) -> Result<(), Cancelled> {
        if self.probe.reachable().await {
            return Ok(());
        }

        tracing::info!("Waiting for network to come back");
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return Err(Cancelled),
                _ = ticker.tick() => {}
            }

            if self.probe.reachable().await {
                tracing::info!("Network is back");
                return Ok(());
            }
        }
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(Arc::new(DnsProbe::default()), DEFAULT_POLL_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Unreachable for the first `failures` probes.
    struct FlakyProbe {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Probe for FlakyProbe {
        async fn reachable(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst) >= self.failures
        }
    }

    fn flaky(failures: usize) -> Arc<FlakyProbe> {
        Arc::new(FlakyProbe {
            failures,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_immediately() {
        let probe = flaky(0);
        let monitor = NetworkMonitor::new(probe.clone(), Duration::from_secs(5));
        let start = tokio::time::Instant::now();

        monitor.wait_until_ready(&CancellationToken::new()).await.unwrap();

        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_at_fixed_interval() {
        let probe = flaky(3);
        let monitor = NetworkMonitor::new(probe.clone(), Duration::from_secs(5));
        let start = tokio::time::Instant::now();

        monitor.wait_until_ready(&CancellationToken::new()).await.unwrap();

        assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_ends_wait() {
        let monitor = NetworkMonitor::new(flaky(usize::MAX), Duration::from_secs(5));
        let shutdown = CancellationToken::new();

        let canceller = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            canceller.cancel();
        });

        assert_eq!(monitor.wait_until_ready(&shutdown).await, Err(Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped() {
        let probe = flaky(2);
        let monitor = NetworkMonitor::new(probe.clone(), Duration::ZERO);
        let start = tokio::time::Instant::now();

        monitor.wait_until_ready(&CancellationToken::new()).await.unwrap();

        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), MIN_POLL_INTERVAL * 2);
    }
}
