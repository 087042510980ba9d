//! Lifecycle notifications published by the lifecycle controller.
//!
//! Owning views subscribe to these instead of inspecting the poller. The
//! latest snapshot itself lives in the [`JobStateStore`](crate::store::JobStateStore).

use neural_core::job::Job;
use neural_core::types::JobId;
use serde::Serialize;

/// A lifecycle change of the job tracked by one controller.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// The service created a job and polling began.
    Started { job_id: JobId },

    /// A non-terminal status update arrived.
    Progress { job: Job },

    /// The job completed. Published exactly once per session.
    Completed { job: Job },

    /// The job itself reported `failed`.
    Failed { job_id: JobId, error: String },

    /// A status fetch failed; polling continues after `retry_in_ms`.
    FetchFailed {
        job_id: JobId,
        error: String,
        consecutive_failures: u32,
        retry_in_ms: u64,
    },

    /// The configured ceiling of consecutive fetch failures was reached
    /// and polling stopped.
    TrackingLost {
        job_id: JobId,
        error: String,
        consecutive_failures: u32,
    },

    /// Tracking was cancelled by the owner.
    Cancelled {
        job_id: JobId,
        /// Whether the service confirmed the remote cancellation.
        remote_acknowledged: bool,
    },
}

impl LifecycleEvent {
    /// Job the event refers to.
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Started { job_id }
            | Self::Failed { job_id, .. }
            | Self::FetchFailed { job_id, .. }
            | Self::TrackingLost { job_id, .. }
            | Self::Cancelled { job_id, .. } => job_id,
            Self::Progress { job } | Self::Completed { job } => &job.job_id,
        }
    }

    /// No further events follow for this job after a terminal event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. }
                | Self::Failed { .. }
                | Self::TrackingLost { .. }
                | Self::Cancelled { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = LifecycleEvent::Cancelled {
            job_id: JobId::new("job-7").unwrap(),
            remote_acknowledged: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "cancelled");
        assert_eq!(json["job_id"], "job-7");
        assert_eq!(json["remote_acknowledged"], true);
    }

    #[test]
    fn fetch_failures_are_not_terminal() {
        let event = LifecycleEvent::FetchFailed {
            job_id: JobId::new("job-7").unwrap(),
            error: "refused".into(),
            consecutive_failures: 1,
            retry_in_ms: 4000,
        };
        assert!(!event.is_terminal());
        assert_eq!(event.job_id().as_str(), "job-7");
    }
}
