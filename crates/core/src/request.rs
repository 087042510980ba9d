//! Parameters for creating a new forecasting job.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

/// Body of the job-creation call.
///
/// `options` carries model-specific settings (epochs, horizon, ...) and is
/// flattened into the top-level JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    #[validate(length(min = 1, message = "model type must not be empty"))]
    pub model_type: String,

    #[validate(length(min = 1, message = "file id must not be empty"))]
    pub file_id: String,

    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl JobRequest {
    pub fn new(model_type: impl Into<String>, file_id: impl Into<String>) -> Self {
        Self {
            model_type: model_type.into(),
            file_id: file_id.into(),
            options: serde_json::Map::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Check the request before it is sent to the service.
    pub fn check(&self) -> Result<(), CoreError> {
        self.validate()?;
        Ok(())
    }
}
