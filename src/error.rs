use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Configuration(String),

    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Failed to send request: {0}")]
    Network(String),

    #[error("Request failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Unexpected response from server: {0}")]
    Protocol(String),

    #[error("Failed to render response: {0}")]
    Render(String),
}

impl ClientError {
    /// Everything except a missing credential can clear up on a later attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ClientError::Configuration(_))
    }
}
