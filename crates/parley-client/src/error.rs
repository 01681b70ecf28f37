use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// Session missing or rejected. Terminal: the poller stops.
    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidArgument(String),

    /// Network or server-side failure; retried by the next poll.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl ClientError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Unavailable(e.to_string())
    }
}
