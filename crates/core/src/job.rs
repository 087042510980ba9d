//! Snapshot of a tracked job.
//!
//! A [`Job`] is never patched field by field: every status response
//! produces a complete new snapshot that replaces the previous one.

use serde::{Deserialize, Serialize};

use crate::job_status::JobStatus;
use crate::types::{JobId, Timestamp};

/// Error message used when the service reports `failed` without a reason.
pub const UNKNOWN_FAILURE_MESSAGE: &str = "job failed without an error message";

/// Lowest and highest progress values a snapshot can carry.
pub const PROGRESS_MIN: f64 = 0.0;
pub const PROGRESS_MAX: f64 = 100.0;

/// The latest known state of one long-running remote job.
///
/// Deserializing goes through [`Job::new`], so a stored or relayed
/// snapshot obeys the same progress and error rules as a fresh one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "JobRecord")]
pub struct Job {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Completion percentage. Not guaranteed to be monotonic.
    pub progress: f64,
    pub created_at: Option<Timestamp>,
    pub model_type: Option<String>,
    pub file_id: Option<String>,
    pub current_epoch: Option<u32>,
    pub total_epochs: Option<u32>,
    /// Estimated seconds until completion.
    pub time_remaining: Option<f64>,
    /// Free-form training metrics (loss, accuracy, ...).
    pub metrics: Option<serde_json::Value>,
    /// Set if and only if `status` is [`JobStatus::Failed`].
    pub error: Option<String>,
}

impl Job {
    /// Create a snapshot with the required fields.
    ///
    /// `progress` is clamped to `0..=100` (NaN becomes 0). A failed job
    /// starts with [`UNKNOWN_FAILURE_MESSAGE`] until
    /// [`with_error`](Self::with_error) supplies the real reason.
    pub fn new(job_id: JobId, status: JobStatus, progress: f64) -> Self {
        let error = (status == JobStatus::Failed).then(|| UNKNOWN_FAILURE_MESSAGE.to_string());
        Self {
            job_id,
            status,
            progress: clamp_progress(progress),
            created_at: None,
            model_type: None,
            file_id: None,
            current_epoch: None,
            total_epochs: None,
            time_remaining: None,
            metrics: None,
            error,
        }
    }

    pub fn with_created_at(mut self, created_at: Option<Timestamp>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_model(mut self, model_type: Option<String>, file_id: Option<String>) -> Self {
        self.model_type = model_type;
        self.file_id = file_id;
        self
    }

    pub fn with_epochs(mut self, current: Option<u32>, total: Option<u32>) -> Self {
        self.current_epoch = current;
        self.total_epochs = total;
        self
    }

    pub fn with_time_remaining(mut self, seconds: Option<f64>) -> Self {
        self.time_remaining = seconds.filter(|s| s.is_finite() && *s >= 0.0);
        self
    }

    pub fn with_metrics(mut self, metrics: Option<serde_json::Value>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Attach the failure reason. Ignored unless the job has failed, and
    /// a blank message keeps the generic one.
    pub fn with_error(mut self, error: Option<String>) -> Self {
        if self.status != JobStatus::Failed {
            return self;
        }
        if let Some(message) = error.filter(|m| !m.trim().is_empty()) {
            self.error = Some(message);
        }
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Unchecked serialized form of [`Job`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobRecord {
    job_id: JobId,
    status: JobStatus,
    #[serde(default)]
    progress: f64,
    created_at: Option<Timestamp>,
    model_type: Option<String>,
    file_id: Option<String>,
    current_epoch: Option<u32>,
    total_epochs: Option<u32>,
    time_remaining: Option<f64>,
    metrics: Option<serde_json::Value>,
    error: Option<String>,
}

impl From<JobRecord> for Job {
    fn from(record: JobRecord) -> Self {
        Job::new(record.job_id, record.status, record.progress)
            .with_created_at(record.created_at)
            .with_model(record.model_type, record.file_id)
            .with_epochs(record.current_epoch, record.total_epochs)
            .with_time_remaining(record.time_remaining)
            .with_metrics(record.metrics)
            .with_error(record.error)
    }
}

fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        return PROGRESS_MIN;
    }
    progress.clamp(PROGRESS_MIN, PROGRESS_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> JobId {
        JobId::new("job-1").unwrap()
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(Job::new(id(), JobStatus::Running, 140.0).progress, 100.0);
        assert_eq!(Job::new(id(), JobStatus::Running, -3.0).progress, 0.0);
        assert_eq!(Job::new(id(), JobStatus::Running, f64::NAN).progress, 0.0);
        assert_eq!(Job::new(id(), JobStatus::Running, 42.5).progress, 42.5);
    }

    #[test]
    fn error_is_dropped_for_non_failed_jobs() {
        let job = Job::new(id(), JobStatus::Running, 10.0).with_error(Some("boom".into()));
        assert!(job.error.is_none());

        let job = Job::new(id(), JobStatus::Completed, 100.0).with_error(Some("boom".into()));
        assert!(job.error.is_none());
    }

    #[test]
    fn failed_job_always_has_an_error() {
        let job = Job::new(id(), JobStatus::Failed, 50.0);
        assert_eq!(job.error.as_deref(), Some(UNKNOWN_FAILURE_MESSAGE));

        let job = Job::new(id(), JobStatus::Failed, 50.0).with_error(Some("  ".into()));
        assert_eq!(job.error.as_deref(), Some(UNKNOWN_FAILURE_MESSAGE));

        let job = Job::new(id(), JobStatus::Failed, 50.0).with_error(Some("out of memory".into()));
        assert_eq!(job.error.as_deref(), Some("out of memory"));
    }

    #[test]
    fn negative_time_remaining_is_discarded() {
        let job = Job::new(id(), JobStatus::Running, 1.0).with_time_remaining(Some(-5.0));
        assert!(job.time_remaining.is_none());
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let job = Job::new(id(), JobStatus::Running, 30.0).with_epochs(Some(3), Some(10));
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["jobId"], "job-1");
        assert_eq!(json["status"], "running");
        assert_eq!(json["currentEpoch"], 3);
        assert_eq!(json["totalEpochs"], 10);
    }

    #[test]
    fn deserializing_applies_snapshot_rules() {
        let job: Job = serde_json::from_value(serde_json::json!({
            "jobId": "job-1",
            "status": "running",
            "progress": 250,
            "error": "stale message",
            "timeRemaining": -1.0,
        }))
        .unwrap();
        assert_eq!(job.progress, 100.0);
        assert!(job.error.is_none());
        assert!(job.time_remaining.is_none());

        let job: Job = serde_json::from_value(serde_json::json!({
            "jobId": "job-1",
            "status": "failed",
            "progress": -4,
        }))
        .unwrap();
        assert_eq!(job.progress, 0.0);
        assert_eq!(job.error.as_deref(), Some(UNKNOWN_FAILURE_MESSAGE));
    }

    #[test]
    fn serialized_snapshot_reads_back_unchanged() {
        let job = Job::new(id(), JobStatus::Failed, 35.0)
            .with_epochs(Some(7), Some(20))
            .with_error(Some("loss diverged".into()));
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(serde_json::from_value::<Job>(json).unwrap(), job);
    }
}
