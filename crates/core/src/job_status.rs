//! Job status values reported by the forecasting service.
//!
//! The string names must match the `status` field of the job creation and
//! job status responses.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The job is queued and has not started.
pub const STATUS_PENDING: &str = "pending";

/// The job is executing (training epochs or prediction batches).
pub const STATUS_RUNNING: &str = "running";

/// The job finished successfully.
pub const STATUS_COMPLETED: &str = "completed";

/// The job stopped with an error.
pub const STATUS_FAILED: &str = "failed";

/// Lifecycle status of a remote job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// `completed` and `failed` end a job; nothing is polled after them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => STATUS_PENDING,
            Self::Running => STATUS_RUNNING,
            Self::Completed => STATUS_COMPLETED,
            Self::Failed => STATUS_FAILED,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
