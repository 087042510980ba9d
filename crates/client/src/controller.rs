//! Start, track and cancel one job per slot.
//!
//! [`LifecycleController`] wires a [`Poller`] to a [`JobStateStore`] and
//! publishes [`LifecycleEvent`]s to its owner. It never infers its own
//! lifecycle: the owner calls [`start`](LifecycleController::start),
//! [`cancel`](LifecycleController::cancel) or
//! [`stop`](LifecycleController::stop) (e.g. when a view unmounts).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use neural_core::error::CoreError;
use neural_core::job::Job;
use neural_core::job_status::JobStatus;
use neural_core::request::JobRequest;
use neural_core::types::{JobId, Timestamp};
use tokio::sync::broadcast;

use crate::api::{JobApi, JobApiError};
use crate::events::LifecycleEvent;
use crate::poller::{PollConfig, PollFailure, PollObserver, Poller, PollerState};
use crate::store::JobStateStore;

/// Broadcast channel capacity for lifecycle events.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Errors from [`LifecycleController::start`]. No polling begins.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    /// The request was rejected before reaching the service.
    #[error("Invalid job request: {0}")]
    InvalidRequest(#[from] CoreError),

    /// The job-creation call failed.
    #[error("Failed to create job: {0}")]
    Create(#[from] JobApiError),

    /// `stop`, `cancel` or a newer `start` ran while the job was being
    /// created. The created job is not tracked.
    #[error("Job {0} was created after tracking was abandoned")]
    Abandoned(JobId),
}

/// Result of [`LifecycleController::cancel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOutcome {
    pub job_id: JobId,
    /// The service confirmed the cancellation. `false` when it refused
    /// or could not be reached; local tracking is stopped either way.
    pub remote_acknowledged: bool,
}

/// Poller plus the generation that owns the slot.
///
/// Every `start`, `watch`, `stop` and `cancel` bumps `generation` under
/// this lock; a `start` whose creation call resolves under a different
/// generation must not touch the store.
struct Tracking {
    poller: Poller,
    generation: u64,
    /// Generation that was current when `cancel` last ran.
    cancelled: Option<u64>,
}

impl Tracking {
    /// Abandon the current session and return the new generation.
    fn abandon(&mut self, store: &JobStateStore) -> u64 {
        self.generation += 1;
        self.poller.stop();
        store.clear();
        self.generation
    }
}

/// Orchestrates the lifecycle of the job tracked in one slot.
pub struct LifecycleController {
    api: Arc<dyn JobApi>,
    store: JobStateStore,
    tracking: Mutex<Tracking>,
    event_tx: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleController {
    pub fn new(api: Arc<dyn JobApi>, config: PollConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tracking: Mutex::new(Tracking {
                poller: Poller::new(Arc::clone(&api), config),
                generation: 0,
                cancelled: None,
            }),
            api,
            store: JobStateStore::new(),
            event_tx,
        }
    }

    /// Latest snapshot of the tracked job.
    pub fn store(&self) -> &JobStateStore {
        &self.store
    }

    /// Subscribe to lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.event_tx.subscribe()
    }

    /// Job of the current (or last) session.
    pub fn job_id(&self) -> Option<JobId> {
        self.tracking().poller.job_id().cloned()
    }

    pub fn poller_state(&self) -> PollerState {
        self.tracking().poller.state()
    }

    /// Create a job and track it until it reaches a terminal status.
    ///
    /// Any job tracked so far is abandoned first (its remote job keeps
    /// running). On error the store stays empty and nothing is polled.
    ///
    /// If [`stop`](Self::stop), [`cancel`](Self::cancel) or another
    /// `start` runs before the service answers, the created job is not
    /// tracked and [`StartError::Abandoned`] is returned. After a
    /// `cancel` the created job is also cancelled remotely.
    pub async fn start(&self, request: &JobRequest) -> Result<JobId, StartError> {
        let generation = self.tracking().abandon(&self.store);
        request.check()?;

        let job = self.api.create_job(request).await.map_err(|e| {
            tracing::error!(model_type = %request.model_type, error = %e, "Job creation failed");
            StartError::Create(e)
        })?;
        let job_id = job.job_id.clone();

        let cancelled = {
            let mut tracking = self.tracking();
            if tracking.generation == generation {
                self.begin_tracking(&mut tracking, job);
                return Ok(job_id);
            }
            tracking.cancelled == Some(generation)
        };

        tracing::info!(job_id = %job_id, cancelled, "Job created after tracking was abandoned");
        if cancelled {
            let remote_acknowledged = self.cancel_remote(&job_id).await;
            let _ = self.event_tx.send(LifecycleEvent::Cancelled {
                job_id: job_id.clone(),
                remote_acknowledged,
            });
        }
        Err(StartError::Abandoned(job_id))
    }

    /// Track a job that was created elsewhere.
    ///
    /// The store stays empty until the first status fetch answers.
    pub fn watch(&self, job_id: JobId) {
        let mut tracking = self.tracking();
        tracking.abandon(&self.store);
        self.launch(&mut tracking, job_id, None);
    }

    /// Cancel the tracked job.
    ///
    /// Local tracking stops and the store is cleared before the service
    /// is asked to cancel; a failed remote call is only logged. Returns
    /// `None` if no job is being tracked. A `start` still waiting for the
    /// service is abandoned and cancels its job once it is created.
    pub async fn cancel(&self) -> Option<CancelOutcome> {
        let job_id = {
            let mut tracking = self.tracking();
            let generation = tracking.generation;
            tracking.cancelled = Some(generation);
            if tracking.poller.state() != PollerState::Active {
                // Invalidates a start that is still creating its job.
                tracking.generation += 1;
                return None;
            }
            let job_id = tracking.poller.job_id().cloned();
            tracking.abandon(&self.store);
            job_id?
        };

        let remote_acknowledged = self.cancel_remote(&job_id).await;

        tracing::info!(job_id = %job_id, remote_acknowledged, "Job cancelled");
        let _ = self.event_tx.send(LifecycleEvent::Cancelled {
            job_id: job_id.clone(),
            remote_acknowledged,
        });

        Some(CancelOutcome {
            job_id,
            remote_acknowledged,
        })
    }

    /// Stop tracking and clear the store without touching the remote job.
    pub fn stop(&self) {
        self.tracking().abandon(&self.store);
    }

    // ---- private helpers ----

    fn tracking(&self) -> MutexGuard<'_, Tracking> {
        self.tracking.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask the service to cancel `job_id`; failures are only logged.
    async fn cancel_remote(&self, job_id: &JobId) -> bool {
        match self.api.cancel_job(job_id).await {
            Ok(acknowledged) => {
                if !acknowledged {
                    tracing::warn!(job_id = %job_id, "Service refused to cancel job");
                }
                acknowledged
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Job cancellation request failed");
                false
            }
        }
    }

    fn begin_tracking(&self, tracking: &mut Tracking, job: Job) {
        let job_id = job.job_id.clone();
        let created_at = job.created_at;

        tracing::info!(job_id = %job_id, status = %job.status, "Tracking job");
        self.store.set(job);
        let _ = self.event_tx.send(LifecycleEvent::Started {
            job_id: job_id.clone(),
        });

        self.launch(tracking, job_id, created_at);
    }

    fn launch(&self, tracking: &mut Tracking, job_id: JobId, created_at: Option<Timestamp>) {
        let observer = Arc::new(SessionObserver {
            job_id: job_id.clone(),
            store: self.store.clone(),
            event_tx: self.event_tx.clone(),
            created_at,
        });
        tracking.poller.start(job_id, observer);
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.tracking().poller.stop();
    }
}

/// Routes poll results of one session into the store and the event
/// channel.
struct SessionObserver {
    job_id: JobId,
    store: JobStateStore,
    event_tx: broadcast::Sender<LifecycleEvent>,
    /// Creation time from the start call; the status endpoint may omit it.
    created_at: Option<Timestamp>,
}

impl PollObserver for SessionObserver {
    fn on_update(&self, job: &Job) {
        let mut job = job.clone();
        if job.created_at.is_none() {
            job.created_at = self.created_at;
        }

        let event = match job.status {
            JobStatus::Completed => {
                tracing::info!(job_id = %job.job_id, "Job completed");
                LifecycleEvent::Completed { job: job.clone() }
            }
            JobStatus::Failed => {
                let error = job.error.clone().unwrap_or_default();
                tracing::warn!(job_id = %job.job_id, error = %error, "Job failed");
                LifecycleEvent::Failed {
                    job_id: job.job_id.clone(),
                    error,
                }
            }
            JobStatus::Pending | JobStatus::Running => LifecycleEvent::Progress { job: job.clone() },
        };

        self.store.set(job);
        let _ = self.event_tx.send(event);
    }

    fn on_error(&self, failure: &PollFailure) {
        let job_id = self.job_id.clone();
        let event = match failure.retry_in {
            Some(delay) => LifecycleEvent::FetchFailed {
                job_id,
                error: failure.error.to_string(),
                consecutive_failures: failure.consecutive_failures,
                retry_in_ms: delay.as_millis() as u64,
            },
            None => {
                tracing::error!(
                    job_id = %job_id,
                    consecutive_failures = failure.consecutive_failures,
                    "Giving up on job status polling",
                );
                LifecycleEvent::TrackingLost {
                    job_id,
                    error: failure.error.to_string(),
                    consecutive_failures: failure.consecutive_failures,
                }
            }
        };
        let _ = self.event_tx.send(event);
    }
}
