use thiserror::Error;

/// Failure talking to the encoding service.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// The referenced resource does not exist (any more).
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The resource is mid-transition and cannot take the request yet.
    #[error("resource {resource} is {state}")]
    Transitioning { resource: String, state: String },

    /// Another pass attached a pipeline to the destination first.
    #[error("pipeline already attached: {0}")]
    Conflict(String),

    #[error("encoding service call timed out")]
    Timeout,

    #[error("encoding service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("encoding service request failed: {0}")]
    Transport(String),

    #[error("invalid encoding service response: {0}")]
    InvalidResponse(String),
}

impl PipelineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}
