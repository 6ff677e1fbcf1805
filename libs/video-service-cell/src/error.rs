use thiserror::Error;

/// Error taxonomy every adapter normalizes vendor failures into before
/// anything crosses the cell boundary.
#[derive(Debug, Error)]
pub enum VideoServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Media access failed: {0}")]
    MediaAccess(String),

    #[error("Operation not supported by this provider: {0}")]
    Unsupported(&'static str),

    #[error("Not joined to a session")]
    NotJoined,

    #[error("Vendor error: {0}")]
    Vendor(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl From<reqwest::Error> for VideoServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VideoServiceError::Timeout(err.to_string())
        } else {
            VideoServiceError::Vendor(err.to_string())
        }
    }
}

impl From<session_cell::DomainError> for VideoServiceError {
    fn from(err: session_cell::DomainError) -> Self {
        VideoServiceError::Validation(err.to_string())
    }
}
