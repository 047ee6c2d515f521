//! Connectivity Supervisor
//!
//! Confirms the proxy actually reaches the internet before timezone
//! detection runs. Checks race HEAD requests against well-known sites;
//! the first success wins.
//!
//! Retries are durable: every failure persists `{ due_at, next_delay }`
//! to shared state, and the loop always derives its next wait from that
//! record. A restarted process therefore resumes the same backoff
//! instead of starting over or retrying immediately.

use fos_network::{first_success, Entrant, Fetch, HttpError, Method};
use fos_timezone::{DetectionTrigger, RetrySchedule, SharedState, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Sites probed for reachability
pub const CHECK_URLS: [&str; 9] = [
    "https://www.google.com/generate_204",
    "https://1.1.1.1",
    "https://www.bing.com",
    "https://github.com",
    "https://www.cloudflare.com",
    "https://www.amazon.com",
    "https://www.wikipedia.org",
    "https://www.facebook.com",
    "https://www.microsoft.com",
];

/// Deadline for each probe
pub const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// First retry delay
pub const INITIAL_RETRY: Duration = Duration::from_secs(2);

/// Backoff ceiling
pub const MAX_RETRY: Duration = Duration::from_secs(5 * 60);

/// Supervisor errors
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Failed to persist retry schedule: {0}")]
    Store(#[from] StoreError),
}

/// Result of one connectivity check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connectivity {
    /// A probe succeeded
    Reachable { via: String },
    /// Every probe failed; next check after `retry_in`
    Unreachable { retry_in: Duration },
}

/// Current wall-clock time in Unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Drives connectivity checks and triggers detection once reachable
pub struct ConnectivitySupervisor<F, T> {
    fetch: Arc<F>,
    state: Arc<SharedState>,
    trigger: Arc<T>,
    urls: Vec<String>,
}

impl<F: Fetch, T: DetectionTrigger> ConnectivitySupervisor<F, T> {
    /// Supervisor probing [`CHECK_URLS`]
    pub fn new(fetch: Arc<F>, state: Arc<SharedState>, trigger: Arc<T>) -> Self {
        Self {
            fetch,
            state,
            trigger,
            urls: CHECK_URLS.iter().map(|u| u.to_string()).collect(),
        }
    }

    /// Replace the probe list
    pub fn with_urls(mut self, urls: Vec<String>) -> Self {
        self.urls = urls;
        self
    }

    /// Forget any pending retry (the proxy was re-applied)
    pub fn reset(&self) -> Result<(), SupervisorError> {
        self.state.set_retry_schedule(None)?;
        Ok(())
    }

    /// Run one check at wall-clock time `now`, updating the durable
    /// retry schedule.
    pub async fn check_at(&self, now: i64) -> Result<Connectivity, SupervisorError> {
        let entrants = self
            .urls
            .iter()
            .map(|url| {
                let fetch = Arc::clone(&self.fetch);
                let url = url.clone();
                Entrant::new(url.clone(), CHECK_TIMEOUT, async move {
                    let response = fetch.fetch(Method::HEAD, &url).await?;
                    if response.is_success() {
                        Ok(url)
                    } else {
                        Err(HttpError::HttpError(format!("HTTP {}", response.status)))
                    }
                })
            })
            .collect();

        match first_success(entrants).await {
            Ok(win) => {
                info!("Connection verified via {}", win.label);
                self.state.set_retry_schedule(None)?;

                if self.state.settings().spoofing_active() {
                    self.trigger.trigger();
                }
                Ok(Connectivity::Reachable { via: win.value })
            }
            Err(e) => {
                let delay = self
                    .state
                    .retry_schedule()
                    .map(|r| r.next_delay())
                    .unwrap_or(INITIAL_RETRY);
                let next = (delay * 2).min(MAX_RETRY);

                warn!(
                    "All {} connection checks failed, retrying in {}s",
                    e.failures().len(),
                    delay.as_secs()
                );
                self.state.set_retry_schedule(Some(RetrySchedule {
                    due_at_ms: now.saturating_add(delay.as_millis() as i64),
                    next_delay_ms: next.as_millis() as u64,
                }))?;
                Ok(Connectivity::Unreachable { retry_in: delay })
            }
        }
    }

    /// Run one check now
    pub async fn check(&self) -> Result<Connectivity, SupervisorError> {
        self.check_at(now_ms()).await
    }

    /// Supervise until `shutdown` flips to `true`.
    ///
    /// Waits for any persisted retry to come due, checks, and after a
    /// success idles until settings change.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), SupervisorError> {
        let mut settings = self.state.subscribe_settings();

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            if !settings.borrow_and_update().enabled {
                debug!("Proxy disabled, supervisor idle");
                self.reset()?;
                tokio::select! {
                    _ = settings.changed() => continue,
                    _ = shutdown.changed() => return Ok(()),
                }
            }

            if let Some(retry) = self.state.retry_schedule() {
                let wait = retry.remaining(now_ms());
                debug!("Next connection check in {:?}", wait);
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = shutdown.changed() => return Ok(()),
                }
            }

            match self.check().await? {
                Connectivity::Unreachable { .. } => continue,
                Connectivity::Reachable { .. } => {
                    tokio::select! {
                        _ = settings.changed() => {}
                        _ = shutdown.changed() => return Ok(()),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fos_network::{Response, StatusCode};
    use fos_timezone::Settings;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Every URL answers with the same status after `delay`
    struct Probe {
        status: u16,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl Probe {
        fn new(status: u16, delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                status,
                delay: Duration::from_millis(delay_ms),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Fetch for Probe {
        fn fetch(
            &self,
            _method: Method,
            url: &str,
        ) -> impl Future<Output = Result<Response, HttpError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (status, delay, url) = (self.status, self.delay, url.to_string());
            async move {
                tokio::time::sleep(delay).await;
                Ok(Response::new(StatusCode::from_u16(status).unwrap(), Vec::new(), &url))
            }
        }
    }

    #[derive(Default)]
    struct CountingTrigger(AtomicUsize);

    impl DetectionTrigger for CountingTrigger {
        fn trigger(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn supervisor(
        probe: Arc<Probe>,
        settings: Settings,
    ) -> (ConnectivitySupervisor<Probe, CountingTrigger>, Arc<SharedState>, Arc<CountingTrigger>) {
        let state = Arc::new(SharedState::in_memory(settings));
        let trigger = Arc::new(CountingTrigger::default());
        let sup = ConnectivitySupervisor::new(probe, Arc::clone(&state), Arc::clone(&trigger))
            .with_urls(vec!["https://a/".into(), "https://b/".into()]);
        (sup, state, trigger)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reachable_triggers_detection() {
        let (sup, state, trigger) = supervisor(Probe::new(204, 50), Settings::spoofing(Vec::new()));
        state
            .set_retry_schedule(Some(RetrySchedule {
                due_at_ms: 0,
                next_delay_ms: 8_000,
            }))
            .unwrap();

        assert!(matches!(sup.check_at(0).await.unwrap(), Connectivity::Reachable { .. }));
        assert_eq!(trigger.0.load(Ordering::SeqCst), 1);
        assert!(state.retry_schedule().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reachable_without_spoofing_skips_detection() {
        let settings = Settings {
            enabled: true,
            ..Settings::default()
        };
        let (sup, _, trigger) = supervisor(Probe::new(200, 50), settings);
        sup.check_at(0).await.unwrap();
        assert_eq!(trigger.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_back_off_durably() {
        let (sup, state, trigger) = supervisor(Probe::new(503, 10), Settings::spoofing(Vec::new()));

        let expected = [(2_000, 4_000), (4_000, 8_000), (8_000, 16_000)];
        for (delay, next) in expected {
            let outcome = sup.check_at(1_000).await.unwrap();
            assert_eq!(
                outcome,
                Connectivity::Unreachable {
                    retry_in: Duration::from_millis(delay)
                }
            );
            assert_eq!(
                state.retry_schedule(),
                Some(RetrySchedule {
                    due_at_ms: 1_000 + delay as i64,
                    next_delay_ms: next,
                })
            );
        }
        assert_eq!(trigger.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_capped() {
        let (sup, state, _) = supervisor(Probe::new(500, 10), Settings::spoofing(Vec::new()));
        state
            .set_retry_schedule(Some(RetrySchedule {
                due_at_ms: 0,
                next_delay_ms: 240_000,
            }))
            .unwrap();

        sup.check_at(0).await.unwrap();
        assert_eq!(state.retry_schedule().map(|r| r.next_delay_ms), Some(300_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_is_failure() {
        let (sup, _, _) = supervisor(Probe::new(200, 6_000), Settings::spoofing(Vec::new()));
        assert!(matches!(sup.check_at(0).await.unwrap(), Connectivity::Unreachable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_resumes_from_durable_schedule() {
        let probe = Probe::new(503, 10);
        let (sup, state, _) = supervisor(Arc::clone(&probe), Settings::spoofing(Vec::new()));
        state
            .set_retry_schedule(Some(RetrySchedule {
                due_at_ms: now_ms(),
                next_delay_ms: 4_000,
            }))
            .unwrap();

        let (stop_tx, stop_rx) = watch::channel(false);
        let sup = Arc::new(sup);
        let runner = {
            let sup = Arc::clone(&sup);
            tokio::spawn(async move { sup.run(stop_rx).await })
        };

        while state.retry_schedule().map(|r| r.next_delay_ms) != Some(32_000) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        stop_tx.send(true).unwrap();
        runner.await.unwrap().unwrap();

        // Resumed at 4s rather than restarting at 2s: 4 → 8 → 16 → 32
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3 * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_idles_when_proxy_disabled() {
        let probe = Probe::new(200, 10);
        let (sup, state, _) = supervisor(Arc::clone(&probe), Settings::default());
        state
            .set_retry_schedule(Some(RetrySchedule {
                due_at_ms: 0,
                next_delay_ms: 4_000,
            }))
            .unwrap();

        let (stop_tx, stop_rx) = watch::channel(false);
        let runner = tokio::spawn(async move { sup.run(stop_rx).await });

        tokio::time::sleep(Duration::from_secs(30)).await;
        stop_tx.send(true).unwrap();
        runner.await.unwrap().unwrap();

        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
        assert!(state.retry_schedule().is_none());
    }
}
