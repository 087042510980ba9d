//! Follow one job until it reaches a terminal state.
//!
//! Subscribes to the controller's lifecycle events, logs each of them and
//! returns how tracking ended. A shutdown signal (Ctrl-C in the binary)
//! cancels a job this process created, or simply stops watching a job
//! that was created elsewhere.

use std::future::Future;

use neural_client::config::ConfigError;
use neural_client::controller::{LifecycleController, StartError};
use neural_client::events::LifecycleEvent;
use neural_core::error::CoreError;
use neural_core::job::Job;
use neural_core::job_status::JobStatus;
use tokio::sync::broadcast::error::RecvError;

use crate::cli::{Command, Target};

/// Errors that end the tracker before the job does.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Start(#[from] StartError),

    #[error("Invalid job id: {0}")]
    InvalidJobId(#[from] CoreError),

    #[error("Invalid option {0:?}, expected KEY=VALUE")]
    InvalidOption(String),

    #[error("Lifecycle event channel closed")]
    EventsClosed,
}

/// How tracking ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(Job),
    Failed { error: String },
    /// The remote job was cancelled on shutdown.
    Cancelled { remote_acknowledged: bool },
    /// Watching stopped on shutdown; the remote job was left running.
    Detached,
    /// Too many status fetches failed in a row.
    Lost { error: String },
}

impl Outcome {
    /// Process exit code: 0 only for a completed job.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed(_) => 0,
            _ => 1,
        }
    }
}

/// Start or watch the job described by `command` and follow it.
pub async fn run<S>(
    controller: &LifecycleController,
    command: &Command,
    shutdown: S,
) -> Result<Outcome, TrackerError>
where
    S: Future<Output = ()>,
{
    let mut rx = controller.subscribe();

    let owned = match command.target()? {
        Target::Create(request) => {
            controller.start(&request).await?;
            true
        }
        Target::Existing(job_id) => {
            tracing::info!(job_id = %job_id, "Watching job");
            controller.watch(job_id);
            false
        }
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                return Ok(interrupt(controller, owned).await);
            }
            event = rx.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Missed lifecycle events");
                        continue;
                    }
                    Err(RecvError::Closed) => return Err(TrackerError::EventsClosed),
                };
                if let Some(outcome) = handle_event(event) {
                    return Ok(outcome);
                }
            }
        }
    }
}

async fn interrupt(controller: &LifecycleController, owned: bool) -> Outcome {
    if !owned {
        tracing::info!("Stopped watching; job keeps running");
        controller.stop();
        return Outcome::Detached;
    }

    tracing::info!("Cancelling job");
    match controller.cancel().await {
        Some(outcome) => Outcome::Cancelled {
            remote_acknowledged: outcome.remote_acknowledged,
        },
        // The job finished between the signal and the cancel call.
        None => match controller.store().snapshot() {
            Some(job) if job.status == JobStatus::Completed => Outcome::Completed(job),
            _ => Outcome::Cancelled {
                remote_acknowledged: false,
            },
        },
    }
}

/// Log one event; return the outcome if it ends tracking.
fn handle_event(event: LifecycleEvent) -> Option<Outcome> {
    match event {
        LifecycleEvent::Started { job_id } => {
            tracing::info!(job_id = %job_id, "Job started");
            None
        }
        LifecycleEvent::Progress { job } => {
            tracing::info!(
                job_id = %job.job_id,
                status = %job.status,
                progress = job.progress,
                epoch = job.current_epoch,
                total_epochs = job.total_epochs,
                time_remaining = job.time_remaining,
                "Job progress",
            );
            None
        }
        LifecycleEvent::FetchFailed {
            job_id,
            error,
            consecutive_failures,
            retry_in_ms,
        } => {
            tracing::warn!(
                job_id = %job_id,
                consecutive_failures,
                retry_in_ms,
                error = %error,
                "Status check failed, retrying",
            );
            None
        }
        LifecycleEvent::Completed { job } => {
            tracing::info!(job_id = %job.job_id, metrics = ?job.metrics, "Job completed");
            Some(Outcome::Completed(job))
        }
        LifecycleEvent::Failed { job_id, error } => {
            tracing::error!(job_id = %job_id, error = %error, "Job failed");
            Some(Outcome::Failed { error })
        }
        LifecycleEvent::TrackingLost {
            job_id,
            error,
            consecutive_failures,
        } => {
            tracing::error!(
                job_id = %job_id,
                consecutive_failures,
                error = %error,
                "Lost track of job",
            );
            Some(Outcome::Lost { error })
        }
        LifecycleEvent::Cancelled {
            job_id,
            remote_acknowledged,
        } => {
            tracing::info!(job_id = %job_id, remote_acknowledged, "Job cancelled");
            Some(Outcome::Cancelled {
                remote_acknowledged,
            })
        }
    }
}
