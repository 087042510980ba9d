//! In-memory [`JobApi`] for tests.
//!
//! [`ScriptedJobApi`] replays a queue of scripted status responses, one
//! per `fetch_status` call, and records every call with the (Tokio)
//! instant it was made. Pair it with `#[tokio::test(start_paused = true)]`
//! to check timing without real sleeps.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use neural_core::job::Job;
use neural_core::job_status::JobStatus;
use neural_core::request::JobRequest;
use neural_core::types::JobId;
use tokio::time::Instant;

use crate::api::{JobApi, JobApiError};

/// One scripted answer to `fetch_status`.
pub enum Step {
    /// Answer with a snapshot after an optional delay.
    Respond { delay: Duration, status: JobStatus, progress: f64, error: Option<String> },
    /// Fail with a connectivity error after an optional delay.
    NetworkError { delay: Duration },
    /// Fail with an HTTP error response.
    RemoteError { status: u16 },
    /// Never answer (exercises request timeouts and cancellation).
    Hang,
}

impl Step {
    pub fn running(progress: f64) -> Self {
        Self::Respond { delay: Duration::ZERO, status: JobStatus::Running, progress, error: None }
    }

    pub fn completed() -> Self {
        Self::Respond { delay: Duration::ZERO, status: JobStatus::Completed, progress: 100.0, error: None }
    }

    pub fn failed(progress: f64, error: &str) -> Self {
        Self::Respond {
            delay: Duration::ZERO,
            status: JobStatus::Failed,
            progress,
            error: Some(error.to_string()),
        }
    }

    pub fn network_error() -> Self {
        Self::NetworkError { delay: Duration::ZERO }
    }

    /// Delay this step's answer.
    pub fn after(self, delay: Duration) -> Self {
        match self {
            Self::Respond { status, progress, error, .. } => Self::Respond { delay, status, progress, error },
            Self::NetworkError { .. } => Self::NetworkError { delay },
            other => other,
        }
    }
}

/// How `create_job` answers.
#[derive(Debug, Clone, Copy)]
pub enum CreateBehavior {
    /// Return a pending job with this id.
    Succeed(&'static str),
    /// Return a pending job with this id once the delay has passed.
    SucceedAfter(&'static str, Duration),
    /// Fail with a connectivity error.
    NetworkError,
    /// Fail with an HTTP error response.
    RemoteError(u16),
}

/// How `cancel_job` answers.
pub enum CancelBehavior {
    Acknowledge,
    Refuse,
    NetworkError,
}

#[derive(Default)]
struct Calls {
    created: Vec<JobRequest>,
    fetched: Vec<(JobId, Instant)>,
    cancelled: Vec<JobId>,
}

/// Scripted job service.
pub struct ScriptedJobApi {
    create: Mutex<VecDeque<CreateBehavior>>,
    steps: Mutex<VecDeque<Step>>,
    cancel: CancelBehavior,
    calls: Mutex<Calls>,
}

impl ScriptedJobApi {
    /// A service whose job creation returns `job_id` and whose status
    /// endpoint replays `steps`. Once the script runs out every fetch
    /// hangs.
    pub fn new(job_id: &'static str, steps: Vec<Step>) -> Self {
        Self {
            create: Mutex::new(VecDeque::from([CreateBehavior::Succeed(job_id)])),
            steps: Mutex::new(steps.into()),
            cancel: CancelBehavior::Acknowledge,
            calls: Mutex::new(Calls::default()),
        }
    }

    /// Script successive `create_job` answers (the last one repeats).
    pub fn with_create(self, behaviors: Vec<CreateBehavior>) -> Self {
        *lock(&self.create) = behaviors.into();
        self
    }

    pub fn with_cancel(mut self, behavior: CancelBehavior) -> Self {
        self.cancel = behavior;
        self
    }

    /// Append more status answers.
    pub fn push_steps(&self, steps: Vec<Step>) {
        lock(&self.steps).extend(steps);
    }

    pub fn fetch_count(&self) -> usize {
        lock(&self.calls).fetched.len()
    }

    /// Job ids in the order they were fetched.
    pub fn fetched_ids(&self) -> Vec<JobId> {
        lock(&self.calls).fetched.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Instants at which fetches were issued.
    pub fn fetch_instants(&self) -> Vec<Instant> {
        lock(&self.calls).fetched.iter().map(|(_, at)| *at).collect()
    }

    pub fn create_count(&self) -> usize {
        lock(&self.calls).created.len()
    }

    pub fn cancelled_ids(&self) -> Vec<JobId> {
        lock(&self.calls).cancelled.clone()
    }

    fn next_create(&self) -> CreateBehavior {
        let mut queue = lock(&self.create);
        match queue.len() {
            0 => CreateBehavior::NetworkError,
            1 => queue[0],
            _ => queue.pop_front().unwrap_or(CreateBehavior::NetworkError),
        }
    }
}

#[async_trait]
impl JobApi for ScriptedJobApi {
    async fn create_job(&self, request: &JobRequest) -> Result<Job, JobApiError> {
        lock(&self.calls).created.push(request.clone());
        let behavior = self.next_create();
        if let CreateBehavior::SucceedAfter(_, delay) = behavior {
            tokio::time::sleep(delay).await;
        }
        match behavior {
            CreateBehavior::Succeed(id) | CreateBehavior::SucceedAfter(id, _) => {
                let job_id = JobId::new(id).map_err(|e| JobApiError::Decode(e.to_string()))?;
                Ok(Job::new(job_id, JobStatus::Pending, 0.0)
                    .with_created_at(Some(Utc::now()))
                    .with_model(Some(request.model_type.clone()), Some(request.file_id.clone())))
            }
            CreateBehavior::NetworkError => Err(JobApiError::Network("connection refused".into())),
            CreateBehavior::RemoteError(status) => Err(JobApiError::Remote {
                status,
                body: "{\"detail\":\"rejected\"}".into(),
            }),
        }
    }

    async fn fetch_status(&self, job_id: &JobId) -> Result<Job, JobApiError> {
        lock(&self.calls).fetched.push((job_id.clone(), Instant::now()));
        let step = lock(&self.steps).pop_front().unwrap_or(Step::Hang);

        match step {
            Step::Respond { delay, status, progress, error } => {
                tokio::time::sleep(delay).await;
                Ok(Job::new(job_id.clone(), status, progress).with_error(error))
            }
            Step::NetworkError { delay } => {
                tokio::time::sleep(delay).await;
                Err(JobApiError::Network("connection reset".into()))
            }
            Step::RemoteError { status } => Err(JobApiError::Remote {
                status,
                body: "internal error".into(),
            }),
            Step::Hang => std::future::pending().await,
        }
    }

    async fn cancel_job(&self, job_id: &JobId) -> Result<bool, JobApiError> {
        lock(&self.calls).cancelled.push(job_id.clone());
        match self.cancel {
            CancelBehavior::Acknowledge => Ok(true),
            CancelBehavior::Refuse => Ok(false),
            CancelBehavior::NetworkError => Err(JobApiError::Network("connection refused".into())),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
