//! Fixed-interval status polling for a single job.
//!
//! A [`Poller`] runs at most one poll session at a time. Each session is
//! a spawned task that sleeps for the poll interval, fetches the job
//! status, forwards the result to a [`PollObserver`] and repeats until
//! the job reaches a terminal status or the session is stopped. Fetches
//! never overlap: the next sleep starts only after the previous fetch
//! resolved, so updates reach the observer in order.
//!
//! Failed fetches are reported through [`PollObserver::on_error`] and
//! retried after a capped exponential backoff (see [`crate::backoff`]).

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use neural_core::job::Job;
use neural_core::job_status::JobStatus;
use neural_core::types::JobId;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{JobApi, JobApiError};
use crate::backoff::{self, BackoffConfig};

/// Default delay between two status fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Default upper bound for a single status fetch.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunable polling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Delay between a resolved fetch and the next one.
    pub interval: Duration,
    /// Retry delays after failed fetches.
    pub backoff: BackoffConfig,
    /// A fetch taking longer than this counts as a failure.
    pub request_timeout: Duration,
    /// Stop the session after this many failures in a row. `None` retries
    /// until the session is stopped.
    pub max_consecutive_failures: Option<u32>,
}

impl PollConfig {
    /// Defaults with a custom interval; the backoff cap follows the
    /// interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            backoff: BackoffConfig::for_interval(interval),
            ..Self::default()
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            backoff: BackoffConfig::for_interval(DEFAULT_POLL_INTERVAL),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_consecutive_failures: None,
        }
    }
}

/// Lifecycle of a poller's current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// No session has been started.
    Idle,
    /// A session is polling.
    Active,
    /// The last session ended; a new `start` opens a fresh one.
    Stopped,
}

/// Why a poll session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The job reached `completed` or `failed`.
    Terminal(JobStatus),
    /// [`Poller::stop`] was called (or the poller was dropped or restarted).
    Stopped,
    /// [`PollConfig::max_consecutive_failures`] was reached.
    RetriesExhausted { consecutive_failures: u32 },
}

/// A failed status fetch as seen by the observer.
#[derive(Debug)]
pub struct PollFailure {
    pub error: JobApiError,
    /// Failures in a row, including this one.
    pub consecutive_failures: u32,
    /// Delay before the retry, or `None` when the session gives up.
    pub retry_in: Option<Duration>,
}

/// Receives the results of a poll session.
///
/// Callbacks run inside the session's delivery gate. They must return
/// quickly and must not call [`Poller::stop`] on the poller that invokes
/// them.
pub trait PollObserver: Send + Sync {
    /// A status fetch succeeded. Called once more with the terminal
    /// snapshot before the session ends.
    fn on_update(&self, job: &Job);

    /// A status fetch failed.
    fn on_error(&self, failure: &PollFailure);
}

/// Tracks whether a session may still deliver callbacks.
///
/// Delivery and closing take the same lock, so once [`close`](Self::close)
/// returns no callback of the session is running or will run.
struct SessionGate {
    state: Mutex<PollerState>,
}

impl SessionGate {
    fn open() -> Self {
        Self {
            state: Mutex::new(PollerState::Active),
        }
    }

    /// Run `f` if the session is still active. Returns whether it ran.
    fn deliver(&self, f: impl FnOnce()) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != PollerState::Active {
            return false;
        }
        f();
        true
    }

    /// Mark the session stopped. Returns `true` if it was active.
    fn close(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let was_active = *state == PollerState::Active;
        *state = PollerState::Stopped;
        was_active
    }

    fn state(&self) -> PollerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct PollSession {
    job_id: JobId,
    gate: Arc<SessionGate>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<StopReason>>,
    outcome: Option<StopReason>,
}

/// Polls one job at a time. Must be used inside a Tokio runtime.
pub struct Poller {
    api: Arc<dyn JobApi>,
    config: PollConfig,
    session: Option<PollSession>,
}

impl Poller {
    pub fn new(api: Arc<dyn JobApi>, config: PollConfig) -> Self {
        Self {
            api,
            config,
            session: None,
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Begin a new session for `job_id`, stopping any current one first.
    pub fn start(&mut self, job_id: JobId, observer: Arc<dyn PollObserver>) {
        self.stop();

        let gate = Arc::new(SessionGate::open());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_session(
            Arc::clone(&self.api),
            self.config.clone(),
            job_id.clone(),
            observer,
            Arc::clone(&gate),
            cancel.clone(),
        ));

        self.session = Some(PollSession {
            job_id,
            gate,
            cancel,
            handle: Some(handle),
            outcome: None,
        });
    }

    /// Stop the current session.
    ///
    /// No observer callback of the session runs after this returns. An
    /// in-flight fetch is dropped and its result never delivered.
    pub fn stop(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        if session.gate.close() {
            tracing::info!(job_id = %session.job_id, "Polling stopped by owner");
        }
        session.cancel.cancel();
    }

    pub fn state(&self) -> PollerState {
        self.session
            .as_ref()
            .map_or(PollerState::Idle, |session| session.gate.state())
    }

    /// Job tracked by the current (or last) session.
    pub fn job_id(&self) -> Option<&JobId> {
        self.session.as_ref().map(|session| &session.job_id)
    }

    /// Wait for the current session to end and return why it ended.
    ///
    /// Returns `None` if no session was ever started or its task panicked.
    pub async fn wait(&mut self) -> Option<StopReason> {
        let session = self.session.as_mut()?;
        if let Some(handle) = session.handle.take() {
            match handle.await {
                Ok(reason) => session.outcome = Some(reason),
                Err(e) => {
                    tracing::error!(job_id = %session.job_id, error = %e, "Poll task failed");
                }
            }
        }
        session.outcome
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drive one session and close its gate when it ends.
async fn run_session(
    api: Arc<dyn JobApi>,
    config: PollConfig,
    job_id: JobId,
    observer: Arc<dyn PollObserver>,
    gate: Arc<SessionGate>,
    cancel: CancellationToken,
) -> StopReason {
    tracing::info!(
        job_id = %job_id,
        interval_ms = config.interval.as_millis() as u64,
        "Polling started",
    );

    let reason = poll_until_stopped(
        api.as_ref(),
        &config,
        &job_id,
        observer.as_ref(),
        &gate,
        &cancel,
    )
    .await;
    gate.close();

    tracing::info!(job_id = %job_id, ?reason, "Polling finished");
    reason
}

async fn poll_until_stopped(
    api: &dyn JobApi,
    config: &PollConfig,
    job_id: &JobId,
    observer: &dyn PollObserver,
    gate: &SessionGate,
    cancel: &CancellationToken,
) -> StopReason {
    let mut delay = config.interval;
    let mut consecutive_failures = 0u32;
    let mut attempt = 0u64;

    loop {
        // Wait before the next fetch, respecting cancellation.
        tokio::select! {
            _ = cancel.cancelled() => return StopReason::Stopped,
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
        let result = tokio::select! {
            _ = cancel.cancelled() => return StopReason::Stopped,
            result = tokio::time::timeout(config.request_timeout, api.fetch_status(job_id)) => {
                result.unwrap_or_else(|_| Err(JobApiError::Timeout(config.request_timeout)))
            }
        };

        match result {
            Ok(job) => {
                consecutive_failures = 0;
                let status = job.status;
                tracing::debug!(
                    job_id = %job_id,
                    attempt,
                    status = %status,
                    progress = job.progress,
                    "Job status fetched",
                );

                if !gate.deliver(|| observer.on_update(&job)) {
                    return StopReason::Stopped;
                }
                if status.is_terminal() {
                    return StopReason::Terminal(status);
                }
                delay = config.interval;
            }
            Err(error) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                let exhausted = config
                    .max_consecutive_failures
                    .is_some_and(|max| consecutive_failures >= max);
                let retry_in = (!exhausted).then(|| {
                    backoff::retry_delay(config.interval, consecutive_failures, &config.backoff)
                });

                tracing::warn!(
                    job_id = %job_id,
                    attempt,
                    consecutive_failures,
                    retry_in_ms = retry_in.map(|d| d.as_millis() as u64),
                    error = %error,
                    "Job status fetch failed",
                );

                let failure = PollFailure {
                    error,
                    consecutive_failures,
                    retry_in,
                };
                if !gate.deliver(|| observer.on_error(&failure)) {
                    return StopReason::Stopped;
                }
                match retry_in {
                    Some(next) => delay = next,
                    None => return StopReason::RetriesExhausted { consecutive_failures },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = PollConfig::default();
        assert_eq!(config.interval, Duration::from_millis(2000));
        assert_eq!(config.backoff.multiplier, 2.0);
        assert_eq!(config.backoff.max_delay, Duration::from_millis(10_000));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.max_consecutive_failures.is_none());
    }

    #[test]
    fn with_interval_scales_backoff_cap() {
        let config = PollConfig::with_interval(Duration::from_millis(100));
        assert_eq!(config.backoff.max_delay, Duration::from_millis(500));
    }

    #[test]
    fn gate_refuses_delivery_after_close() {
        let gate = SessionGate::open();
        assert!(gate.deliver(|| {}));
        assert!(gate.close());
        assert!(!gate.close());

        let mut ran = false;
        assert!(!gate.deliver(|| ran = true));
        assert!(!ran);
        assert_eq!(gate.state(), PollerState::Stopped);
    }
}
