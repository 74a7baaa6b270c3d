use std::time::Duration;

use thiserror::Error;

use crate::deadline::Interrupted;

/// Errors that can be returned by telestory-fetch operations.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Endpoint or credentials are missing. Raised at construction time so a
    /// misconfigured process never accepts requests.
    #[error("catalog client is not configured: {0}")]
    Config(String),

    /// An HTTP request failed at the network level.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status code.
    #[error("bad status {status} from {url}")]
    Status { status: reqwest::StatusCode, url: String },

    /// The request URL could not be built.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A filesystem I/O error occurred while writing scratch storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The gzip-compressed payload could not be inflated.
    #[error("failed to decompress response: {0}")]
    Decompress(#[source] std::io::Error),

    /// The catalog payload was not the JSON shape we expect.
    #[error("failed to decode response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request cancelled")]
    Cancelled,
}

/// Coarse classification used by callers to pick a user-facing reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Config,
    Transport,
    Decode,
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Config(_) | FetchError::InvalidUrl(_) => FailureKind::Config,
            FetchError::Decompress(_) | FetchError::Json(_) => FailureKind::Decode,
            FetchError::Http(_)
            | FetchError::Status { .. }
            | FetchError::Io(_)
            | FetchError::Timeout(_)
            | FetchError::Cancelled => FailureKind::Transport,
        }
    }
}

impl From<Interrupted> for FetchError {
    fn from(value: Interrupted) -> Self {
        match value {
            Interrupted::Cancelled => FetchError::Cancelled,
            Interrupted::TimedOut(after) => FetchError::Timeout(after),
        }
    }
}
