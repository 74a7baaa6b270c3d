use std::time::Duration;

use telestory_fetch::{FailureKind, FetchError, Interrupted};
use thiserror::Error;

use crate::messenger::MessengerError;

/// Errors that end a request early.
///
/// None of these are shown to the user verbatim; the engine answers with a
/// localized text and logs the detail.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    /// Catalog or media network failure, including timeouts and cancellation.
    #[error("transport error: {0}")]
    Transport(#[source] FetchError),

    #[error("decode error: {0}")]
    Decode(#[source] FetchError),

    #[error("repository error: {0}")]
    Repository(#[from] sqlx::Error),

    #[error("messenger error: {0}")]
    Messenger(#[from] MessengerError),

    #[error("request cancelled")]
    Cancelled,

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

impl From<FetchError> for CoreError {
    fn from(err: FetchError) -> Self {
        match err.kind() {
            FailureKind::Config => CoreError::Config(err.to_string()),
            FailureKind::Transport => CoreError::Transport(err),
            FailureKind::Decode => CoreError::Decode(err),
        }
    }
}

impl From<Interrupted> for CoreError {
    fn from(value: Interrupted) -> Self {
        match value {
            Interrupted::Cancelled => CoreError::Cancelled,
            Interrupted::TimedOut(after) => CoreError::TimedOut(after),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_errors_keep_their_class() {
        assert!(matches!(
            CoreError::from(FetchError::Config("no key".into())),
            CoreError::Config(_)
        ));
        assert!(matches!(
            CoreError::from(FetchError::Timeout(Duration::from_secs(1))),
            CoreError::Transport(_)
        ));
        let bad_json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(
            CoreError::from(FetchError::Json(bad_json)),
            CoreError::Decode(_)
        ));
    }
}
