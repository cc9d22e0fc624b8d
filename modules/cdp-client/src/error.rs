use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CdpError>;

#[derive(Debug, Error)]
pub enum CdpError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),

    #[error("Element not found: {0}")]
    NotFound(String),
}

impl From<chromiumoxide::error::CdpError> for CdpError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        CdpError::Protocol(err.to_string())
    }
}
