use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single request against the task resource.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server responded with {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Outcome of a store operation that did not go through.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Rejected locally; nothing was sent.
    #[error("{0}")]
    Validation(&'static str),

    /// The remote store could not be reached after all retries.
    #[error(transparent)]
    Transport(#[from] ApiError),
}

impl TaskError {
    pub fn is_validation(&self) -> bool {
        matches!(self, TaskError::Validation(_))
    }
}
