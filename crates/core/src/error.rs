#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Job id must not be empty")]
    EmptyJobId,

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}
