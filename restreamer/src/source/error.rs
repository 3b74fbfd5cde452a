use thiserror::Error;

/// Failure to learn the upstream source state.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("source status request failed: {0}")]
    Transport(String),

    #[error("source status request timed out")]
    Timeout,

    #[error("source status endpoint returned {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("invalid source status payload: {0}")]
    InvalidPayload(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}
